use std::fmt;

use {async_trait::async_trait, tracing::warn};

use crate::{
    error::{GatewayError, UploadError},
    staging::StagedFile,
};

/// Opaque identifier of a chat the relay reports to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Opaque identifier the gateway assigned to a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i32> for MessageHandle {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

/// Send and edit the status message of a relay.
#[async_trait]
pub trait StatusChannel: Send + Sync {
    async fn send(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<MessageHandle, GatewayError>;

    async fn edit(
        &self,
        conversation: &ConversationId,
        message: &MessageHandle,
        text: &str,
    ) -> Result<(), GatewayError>;
}

/// Deliver a staged file as a document.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Upload `document`, already rewound for reading, as a reply to
    /// `reply_to`.
    async fn send_document(
        &self,
        conversation: &ConversationId,
        document: &mut StagedFile,
        reply_to: &MessageHandle,
    ) -> Result<(), UploadError>;
}

/// The single status message of one relay.
///
/// Created once, then only ever edited. Edits are best-effort: a failure is
/// logged and otherwise ignored.
pub struct StatusReporter<'a> {
    channel: &'a dyn StatusChannel,
    conversation: &'a ConversationId,
    message: MessageHandle,
    last_text: String,
}

impl<'a> StatusReporter<'a> {
    /// Post the initial status message.
    pub async fn open(
        channel: &'a dyn StatusChannel,
        conversation: &'a ConversationId,
        text: &str,
    ) -> Result<Self, GatewayError> {
        let message = channel.send(conversation, text).await?;
        Ok(Self {
            channel,
            conversation,
            message,
            last_text: text.to_string(),
        })
    }

    pub fn message(&self) -> &MessageHandle {
        &self.message
    }

    /// Replace the status text. Identical text is not re-sent.
    pub async fn update(&mut self, text: &str) {
        if self.last_text == text {
            return;
        }
        match self.channel.edit(self.conversation, &self.message, text).await {
            Ok(()) => self.last_text = text.to_string(),
            Err(e) => warn!(
                conversation = %self.conversation,
                message = %self.message,
                error = %e,
                "status edit failed"
            ),
        }
    }
}

/// Status texts shown to the requester.
pub mod text {
    use crate::progress::ProgressEvent;

    pub const STARTING: &str = "⏳ Starting download...";
    pub const DONE: &str = "✅ File sent successfully!";

    pub fn downloading(event: ProgressEvent) -> String {
        match event {
            ProgressEvent::Percent(p) => format!("⏬ Downloading: {p:.1}%"),
            ProgressEvent::Indeterminate { bytes } => {
                format!("⏬ Downloading: {} so far (size unknown)", format_bytes(bytes))
            },
        }
    }

    pub fn uploading(event: ProgressEvent) -> String {
        match event {
            ProgressEvent::Percent(p) if p < 100.0 => {
                format!("📤 Downloaded {p:.1}%, uploading...")
            },
            ProgressEvent::Percent(_) => "📤 Uploading...".to_string(),
            ProgressEvent::Indeterminate { bytes } => {
                format!("📤 Downloaded {}, uploading...", format_bytes(bytes))
            },
        }
    }

    /// Human-readable size with binary units and one decimal.
    pub fn format_bytes(bytes: u64) -> String {
        const KB: f64 = 1024.0;
        const MB: f64 = KB * 1024.0;
        const GB: f64 = MB * 1024.0;
        let b = bytes as f64;
        if b < KB {
            format!("{bytes} B")
        } else if b < MB {
            format!("{:.1} KB", b / KB)
        } else if b < GB {
            format!("{:.1} MB", b / MB)
        } else {
            format!("{:.1} GB", b / GB)
        }
    }
}
