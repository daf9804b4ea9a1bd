use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    teloxide::{
        ApiError, RequestError,
        payloads::SendDocumentSetters,
        prelude::*,
        types::{ChatAction, ChatId, InputFile, MessageId, ReplyParameters},
    },
    tracing::{debug, info, warn},
};

use ferry_relay::{
    ConversationId, DocumentSink, GatewayError, MessageHandle, StagedFile, StatusChannel,
    UploadError,
};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Status messages and document uploads over the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn run_telegram_request_with_retry<T, F, Fut>(
        &self,
        to: &str,
        operation: &'static str,
        mut request: F,
    ) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id = to,
                            operation,
                            retries,
                            max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        chat_id = to,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

#[async_trait]
impl StatusChannel for TelegramGateway {
    async fn send(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<MessageHandle, GatewayError> {
        let chat_id = parse_chat_id(conversation)?;
        let message = self
            .run_telegram_request_with_retry(conversation.as_str(), "send message", || {
                let req = self.bot.send_message(chat_id, text);
                async move { req.await }
            })
            .await
            .map_err(|e| GatewayError::external("send message", e))?;
        Ok(MessageHandle::from(message.id.0))
    }

    async fn edit(
        &self,
        conversation: &ConversationId,
        message: &MessageHandle,
        text: &str,
    ) -> Result<(), GatewayError> {
        let chat_id = parse_chat_id(conversation)?;
        let message_id = parse_message_id(message)?;
        match self
            .run_telegram_request_with_retry(conversation.as_str(), "edit message", || {
                let req = self.bot.edit_message_text(chat_id, message_id, text);
                async move { req.await }
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(GatewayError::external("edit message", e)),
        }
    }
}

#[async_trait]
impl DocumentSink for TelegramGateway {
    async fn send_document(
        &self,
        conversation: &ConversationId,
        document: &mut StagedFile,
        reply_to: &MessageHandle,
    ) -> Result<(), UploadError> {
        let chat_id =
            parse_chat_id(conversation).map_err(|e| UploadError::transport("send document", e))?;

        if let Err(e) = self
            .bot
            .send_chat_action(chat_id, ChatAction::UploadDocument)
            .await
        {
            debug!(chat_id = conversation.as_str(), error = %e, "upload chat action failed");
        }

        let input = InputFile::file(document.path().to_path_buf())
            .file_name(document.file_name().to_string());
        let mut req = self.bot.send_document(chat_id, input);
        if let Some(rp) = parse_reply_params(Some(reply_to.as_str())) {
            req = req.reply_parameters(rp);
        }

        match req.await {
            Ok(_) => {
                info!(
                    chat_id = conversation.as_str(),
                    reply_to = reply_to.as_str(),
                    file_name = document.file_name(),
                    "telegram document sent"
                );
                Ok(())
            },
            Err(e) if is_too_large_error(&e) => Err(UploadError::too_large(e.to_string())),
            Err(e) => Err(UploadError::transport("send document", e)),
        }
    }
}

fn parse_chat_id(conversation: &ConversationId) -> Result<ChatId, GatewayError> {
    conversation
        .as_str()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|e| GatewayError::external(format!("chat id {conversation}"), e))
}

fn parse_message_id(message: &MessageHandle) -> Result<MessageId, GatewayError> {
    message
        .as_str()
        .parse::<i32>()
        .map(MessageId)
        .map_err(|e| GatewayError::external(format!("message id {message}"), e))
}

/// Parse a platform message ID string into Telegram `ReplyParameters`.
/// Returns `None` if the string is not a valid i32 (Telegram message IDs are i32).
fn parse_reply_params(reply_to: Option<&str>) -> Option<ReplyParameters> {
    reply_to
        .and_then(|id| id.parse::<i32>().ok())
        .map(|id| ReplyParameters::new(MessageId(id)).allow_sending_without_reply())
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

/// Size rejections arrive either as an API description or as a raw HTTP 413
/// page from a proxy in front of the Bot API.
fn is_too_large_error(error: &RequestError) -> bool {
    let text = error.to_string().to_ascii_lowercase();
    text.contains("too large") || text.contains("too big")
}
