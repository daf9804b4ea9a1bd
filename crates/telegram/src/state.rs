use std::sync::Arc;

use {
    ferry_relay::{RelayPipeline, RelayRequest},
    tokio_util::task::TaskTracker,
};

use crate::{config::TelegramConfig, outbound::TelegramGateway};

/// Everything a command handler needs, shared by all relays.
#[derive(Clone)]
pub struct RelayContext {
    pub bot_username: Option<String>,
    pub config: Arc<TelegramConfig>,
    pub gateway: Arc<TelegramGateway>,
    pub pipeline: Arc<RelayPipeline>,
    /// In-flight relays, awaited on shutdown.
    pub tracker: TaskTracker,
}

impl RelayContext {
    /// Run `request` on its own task, tracked until it finishes.
    pub fn spawn_relay(&self, request: RelayRequest) {
        let pipeline = Arc::clone(&self.pipeline);
        self.tracker.spawn(async move {
            // The outcome is logged by the pipeline and shown in the chat.
            let _ = pipeline.run(&request).await;
        });
    }
}
