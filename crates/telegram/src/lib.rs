//! Telegram gateway for ferry.
//!
//! Receives `/url` commands by long polling, hands each one to a
//! [`ferry_relay::RelayPipeline`] task and reports progress by editing a
//! single status message.

pub mod access;
pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod state;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_support;

pub use {
    bot::{Polling, start_polling},
    config::TelegramConfig,
    error::{Error, Result},
    outbound::TelegramGateway,
    state::RelayContext,
};
