use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, error, info, warn},
};

use ferry_relay::{DocumentSink, Fetcher, RelayConfig, RelayPipeline, StatusChannel};

use crate::{
    config::TelegramConfig,
    error::{Error, Result},
    handlers,
    outbound::TelegramGateway,
    state::RelayContext,
};

const POLL_TIMEOUT_SECS: u32 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A running polling loop and the relays it started.
pub struct Polling {
    cancel: CancellationToken,
    tracker: TaskTracker,
    poller: JoinHandle<()>,
}

impl Polling {
    /// Token that stops the polling loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop accepting commands, then wait for in-flight relays to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.poller.await {
            error!(error = %e, "telegram polling task panicked");
        }
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for in-flight relays");
        }
        self.tracker.wait().await;
        info!("telegram bot stopped");
    }
}

/// Build a bot client for `config`.
///
/// The client timeout is longer than the long-polling timeout so the HTTP
/// client doesn't abort `getUpdates` before Telegram responds.
pub fn build_bot(config: &TelegramConfig) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(45))
        .build()
        .map_err(|e| Error::external("build http client", e))?;
    let mut bot = Bot::with_client(config.token.expose_secret(), client);
    if let Some(api_url) = config.api_url()? {
        bot = bot.set_api_url(api_url);
    }
    Ok(bot)
}

/// Connect the bot and start polling for commands.
///
/// Each accepted `/url` command runs a relay on its own task; see
/// [`Polling::shutdown`].
pub async fn start_polling(
    config: TelegramConfig,
    relay: RelayConfig,
    fetcher: Arc<dyn Fetcher>,
) -> anyhow::Result<Polling> {
    let bot = build_bot(&config)?;
    start_polling_with_bot(bot, config, relay, fetcher).await
}

async fn start_polling_with_bot(
    bot: Bot,
    config: TelegramConfig,
    relay: RelayConfig,
    fetcher: Arc<dyn Fetcher>,
) -> anyhow::Result<Polling> {
    // Verify credentials and get bot username.
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    let commands = vec![
        BotCommand::new("url", "Download a file and send it here"),
        BotCommand::new("help", "Show usage"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!(error = %e, "failed to register bot commands");
    }

    info!(
        username = ?bot_username,
        max_file_size = relay.max_file_size,
        "telegram bot connected (webhook cleared)"
    );

    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let pipeline = RelayPipeline::new(
        relay,
        fetcher,
        Arc::clone(&gateway) as Arc<dyn StatusChannel>,
        Arc::clone(&gateway) as Arc<dyn DocumentSink>,
    );
    let tracker = TaskTracker::new();
    let ctx = RelayContext {
        bot_username,
        config: Arc::new(config),
        gateway,
        pipeline: Arc::new(pipeline),
        tracker: tracker.clone(),
    };

    let cancel = CancellationToken::new();
    let poller = tokio::spawn(poll_updates(bot, ctx, cancel.clone()));

    Ok(Polling {
        cancel,
        tracker,
        poller,
    })
}

async fn poll_updates(bot: Bot, ctx: RelayContext, cancel: CancellationToken) {
    info!("starting telegram manual polling loop");
    let mut offset: i32 = 0;

    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message]);
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = request.send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    match update.kind {
                        UpdateKind::Message(msg) => {
                            debug!(chat_id = msg.chat.id.0, "received telegram message");
                            if let Err(e) = handlers::handle_message(msg, &ctx).await {
                                error!(error = %e, "error handling telegram message");
                            }
                        },
                        other => {
                            debug!("ignoring non-message update: {other:?}");
                        },
                    }
                }
            },
            Err(e) => {
                // Another bot instance is running with the same token.
                if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                    warn!(
                        "telegram polling disabled: another instance is already running with this token"
                    );
                    cancel.cancel();
                    break;
                }

                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                }
            },
        }
    }
    info!("telegram polling stopped");
}
