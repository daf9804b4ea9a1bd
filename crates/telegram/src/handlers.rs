use {
    teloxide::types::Message,
    tracing::{debug, info, warn},
    url::Url,
};

use ferry_relay::{ConversationId, MessageHandle, StatusChannel};

use crate::{access, state::RelayContext};

pub const EMPTY_URL_TEXT: &str = "❌ Please provide a URL after the /url command";
pub const INVALID_URL_TEXT: &str = "❌ That doesn't look like a valid http(s) URL";

pub const HELP_TEXT: &str = "Send /url <link> and I will download the file and send it back \
                             here as a document.\n\nExample: /url https://example.com/report.pdf";

/// A command the bot reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/url <argument>`, argument trimmed and possibly empty.
    Relay(String),
    /// `/start` or `/help`.
    Help,
}

/// Parse a message text into a [`Command`].
///
/// Accepts `/cmd` and `/cmd@bot`; the latter only when `bot` names this bot.
/// Anything else, including plain text, yields `None`.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<Command> {
    let text = text.trim_start();
    let rest = text.strip_prefix('/')?;
    let (head, argument) = match rest.split_once(char::is_whitespace) {
        Some((head, argument)) => (head, argument.trim()),
        None => (rest, ""),
    };
    let (name, addressee) = match head.split_once('@') {
        Some((name, addressee)) => (name, Some(addressee)),
        None => (head, None),
    };
    if let (Some(addressee), Some(me)) = (addressee, bot_username)
        && !addressee.eq_ignore_ascii_case(me)
    {
        return None;
    }

    match name.to_ascii_lowercase().as_str() {
        "url" => Some(Command::Relay(argument.to_string())),
        "start" | "help" => Some(Command::Help),
        _ => None,
    }
}

/// Validate the argument of `/url`.
///
/// Returns the chat reply on rejection.
pub fn parse_relay_url(argument: &str) -> Result<Url, &'static str> {
    if argument.is_empty() {
        return Err(EMPTY_URL_TEXT);
    }
    match Url::parse(argument) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(url),
        _ => Err(INVALID_URL_TEXT),
    }
}

/// Handle a single inbound Telegram message (called from the polling loop).
pub async fn handle_message(msg: Message, ctx: &RelayContext) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        debug!("ignoring non-text message");
        return Ok(());
    };
    let Some(command) = parse_command(text, ctx.bot_username.as_deref()) else {
        debug!(chat_id = msg.chat.id.0, "ignoring non-command message");
        return Ok(());
    };

    let chat_id = msg.chat.id.0.to_string();
    let sender_id = msg.from.as_ref().map(|u| u.id.0.to_string());
    let username = msg.from.as_ref().and_then(|u| u.username.as_deref());
    if let Err(reason) = access::check_access(&ctx.config, &chat_id, sender_id.as_deref(), username)
    {
        warn!(chat_id = %chat_id, ?username, %reason, "ignoring command from chat");
        return Ok(());
    }

    let conversation = ConversationId::from(msg.chat.id.0);
    match command {
        Command::Help => {
            ctx.gateway.send(&conversation, HELP_TEXT).await?;
        },
        Command::Relay(argument) => match parse_relay_url(&argument) {
            Ok(url) => {
                info!(chat_id = %chat_id, %url, "relay accepted");
                let request = ctx
                    .pipeline
                    .request(url, conversation, MessageHandle::from(msg.id.0));
                ctx.spawn_relay(request);
            },
            Err(reply) => {
                debug!(chat_id = %chat_id, %argument, "rejecting /url argument");
                ctx.gateway.send(&conversation, reply).await?;
            },
        },
    }
    Ok(())
}
