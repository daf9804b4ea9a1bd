//! Streaming relay pipeline for ferry.
//!
//! Fetches a remote resource, stages it on local disk while reporting
//! throttled progress to a chat, then uploads the staged bytes as a document.
//! The chat platform and the network are reached only through the traits in
//! [`status`] and [`fetch`], so the pipeline runs against stubs in tests.

pub mod error;
pub mod fetch;
pub mod gate;
pub mod pipeline;
pub mod progress;
pub mod staging;
pub mod status;
pub mod throttle;

pub use {
    error::{FetchError, GatewayError, RelayError, TransferStage, UploadError},
    fetch::{BodyReader, FetchedBody, Fetcher, HttpFetcher},
    gate::SizeGate,
    pipeline::{RelayConfig, RelayPhase, RelayPipeline, RelayReport, RelayRequest},
    progress::{PendingProgress, ProgressEvent, ProgressSink, ProgressTap},
    staging::{StagedFile, StagingStore},
    status::{ConversationId, DocumentSink, MessageHandle, StatusChannel, StatusReporter},
    throttle::Throttle,
};
