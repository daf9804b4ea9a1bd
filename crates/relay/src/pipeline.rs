use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use {
    tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
    tracing::{debug, info, warn},
    url::Url,
    uuid::Uuid,
};

use crate::{
    error::{RelayError, TransferStage},
    fetch::{BodyReader, Fetcher},
    gate::SizeGate,
    progress::{PendingProgress, ProgressEvent, ProgressSink, ProgressTap},
    staging::{DEFAULT_FILE_NAME, StagedFile, StagingStore},
    status::{ConversationId, DocumentSink, MessageHandle, StatusChannel, StatusReporter, text},
    throttle::Throttle,
};

/// 2000 MiB, the largest document a local Bot API server accepts.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2000 * 1024 * 1024;

/// Default minimum spacing between progress edits.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(2);

const CHUNK_SIZE: usize = 64 * 1024;

/// Process-wide relay settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Largest declared size accepted before the body is fetched.
    pub max_file_size: u64,
    /// Minimum spacing between progress edits.
    pub status_interval: Duration,
    /// Directory for staged files.
    pub staging_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            status_interval: DEFAULT_STATUS_INTERVAL,
            staging_dir: std::env::temp_dir(),
        }
    }
}

/// One accepted relay command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub url: Url,
    pub conversation: ConversationId,
    /// The message that asked for the relay; the document replies to it.
    pub reply_to: MessageHandle,
    pub ceiling: u64,
}

impl RelayRequest {
    /// Last non-empty path segment of the URL, percent-decoded, used to
    /// name the document.
    pub fn file_name_hint(&self) -> String {
        let Some(segment) = self
            .url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        else {
            return DEFAULT_FILE_NAME.to_string();
        };
        match urlencoding::decode(segment) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => segment.to_string(),
        }
    }
}

/// States of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    Probing,
    /// Rejected before any body transfer.
    Gated,
    Downloading,
    Staged,
    Uploading,
    Done,
    Failed,
}

impl RelayPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Gated | Self::Done | Self::Failed)
    }
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Gated => "gated",
            Self::Downloading => "downloading",
            Self::Staged => "staged",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(phase)
    }
}

/// Summary of a delivered relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub bytes: u64,
    pub declared_size: Option<u64>,
    pub file_name: String,
}

/// Mutable state of one relay, owned by the task running it.
#[derive(Debug)]
struct RelaySession {
    id: Uuid,
    phase: RelayPhase,
    bytes: u64,
    declared: Option<u64>,
}

impl RelaySession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: RelayPhase::Idle,
            bytes: 0,
            declared: None,
        }
    }

    fn advance(&mut self, next: RelayPhase) {
        debug!(relay_id = %self.id, from = %self.phase, to = %next, "relay phase");
        self.phase = next;
    }
}

/// Probe, stage and upload one URL per [`run`](RelayPipeline::run).
pub struct RelayPipeline {
    config: RelayConfig,
    fetcher: Arc<dyn Fetcher>,
    status: Arc<dyn StatusChannel>,
    documents: Arc<dyn DocumentSink>,
    staging: StagingStore,
}

impl RelayPipeline {
    pub fn new(
        config: RelayConfig,
        fetcher: Arc<dyn Fetcher>,
        status: Arc<dyn StatusChannel>,
        documents: Arc<dyn DocumentSink>,
    ) -> Self {
        let staging = StagingStore::new(config.staging_dir.clone());
        Self {
            config,
            fetcher,
            status,
            documents,
            staging,
        }
    }

    /// Build a request carrying the configured ceiling.
    pub fn request(
        &self,
        url: Url,
        conversation: ConversationId,
        reply_to: MessageHandle,
    ) -> RelayRequest {
        RelayRequest {
            url,
            conversation,
            reply_to,
            ceiling: self.config.max_file_size,
        }
    }

    /// Relay `request` to a terminal state.
    ///
    /// The user sees every outcome through the status message; the returned
    /// error is for logging.
    pub async fn run(&self, request: &RelayRequest) -> Result<RelayReport, RelayError> {
        let mut session = RelaySession::new();
        info!(
            relay_id = %session.id,
            url = %request.url,
            conversation = %request.conversation,
            "relay started"
        );

        let result = self.drive(&mut session, request).await;
        match &result {
            Ok(report) => info!(
                relay_id = %session.id,
                bytes = report.bytes,
                file_name = %report.file_name,
                "relay delivered"
            ),
            Err(e) => warn!(
                relay_id = %session.id,
                phase = %session.phase,
                bytes = session.bytes,
                error = %e,
                "relay ended without delivery"
            ),
        }
        result
    }

    async fn drive(
        &self,
        session: &mut RelaySession,
        request: &RelayRequest,
    ) -> Result<RelayReport, RelayError> {
        let mut status =
            match StatusReporter::open(self.status.as_ref(), &request.conversation, text::STARTING)
                .await
            {
                Ok(status) => status,
                Err(source) => {
                    session.advance(RelayPhase::Failed);
                    return Err(RelayError::GatewayUnavailable(source));
                },
            };
        session.advance(RelayPhase::Probing);

        let result = self.relay(session, request, &mut status).await;
        match &result {
            Ok(_) => {
                session.advance(RelayPhase::Done);
                status.update(text::DONE).await;
            },
            Err(e) => {
                session.advance(e.terminal_phase());
                status.update(&e.status_text()).await;
            },
        }
        result
    }

    async fn relay(
        &self,
        session: &mut RelaySession,
        request: &RelayRequest,
        status: &mut StatusReporter<'_>,
    ) -> Result<RelayReport, RelayError> {
        let gate = SizeGate::new(request.ceiling);
        session.declared = gate.check(self.fetcher.as_ref(), &request.url).await?;

        session.advance(RelayPhase::Downloading);
        let mut staged = self
            .staging
            .acquire(&request.file_name_hint())
            .await
            .map_err(|e| RelayError::transfer(TransferStage::Staging, 0, e))?;

        let result = self
            .stage_and_upload(session, request, status, &mut staged)
            .await;

        if let Err(e) = staged.release() {
            warn!(relay_id = %session.id, error = %e, "failed to remove staged file");
        }
        result
    }

    async fn stage_and_upload(
        &self,
        session: &mut RelaySession,
        request: &RelayRequest,
        status: &mut StatusReporter<'_>,
        staged: &mut StagedFile,
    ) -> Result<RelayReport, RelayError> {
        self.download(session, request, status, staged).await?;

        session.advance(RelayPhase::Staged);
        staged
            .rewind_for_read()
            .await
            .map_err(|e| RelayError::transfer(TransferStage::Write, session.bytes, e))?;

        session.advance(RelayPhase::Uploading);
        self.documents
            .send_document(&request.conversation, staged, &request.reply_to)
            .await
            .map_err(RelayError::UploadFailed)?;

        Ok(RelayReport {
            bytes: session.bytes,
            declared_size: session.declared,
            file_name: staged.file_name().to_string(),
        })
    }

    async fn download(
        &self,
        session: &mut RelaySession,
        request: &RelayRequest,
        status: &mut StatusReporter<'_>,
        staged: &mut StagedFile,
    ) -> Result<(), RelayError> {
        let body = self
            .fetcher
            .get(&request.url)
            .await
            .map_err(|e| RelayError::transfer(TransferStage::Request, 0, e))?;
        session.declared = session.declared.or(body.declared_len);

        stream_body(
            session,
            body.reader,
            self.config.status_interval,
            status,
            staged.writer(),
        )
        .await?;
        debug!(relay_id = %session.id, bytes = session.bytes, "body staged");
        Ok(())
    }
}

/// Copy `reader` into `writer`, editing the status as progress survives the
/// throttle, and finish with the uploading status.
async fn stream_body<W: AsyncWrite + Unpin>(
    session: &mut RelaySession,
    reader: BodyReader,
    interval: Duration,
    status: &mut StatusReporter<'_>,
    writer: &mut W,
) -> Result<(), RelayError> {
    let total = session.declared;
    if total.is_none() {
        status
            .update(&text::downloading(ProgressEvent::Indeterminate { bytes: 0 }))
            .await;
    }

    let throttle = Throttle::new(interval, PendingProgress::default());
    let mut tap = ProgressTap::new(reader, total, throttle);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = tap
            .read(&mut buf)
            .await
            .map_err(|e| RelayError::transfer(TransferStage::Read, tap.bytes_read(), e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| RelayError::transfer(TransferStage::Write, session.bytes, e))?;
        session.bytes = tap.bytes_read();

        if total.is_none() {
            tap.sink_mut().on_progress(ProgressEvent::Indeterminate {
                bytes: session.bytes,
            });
        }
        if let Some(event) = tap.sink_mut().get_mut().take() {
            status.update(&text::downloading(event)).await;
        }
    }
    writer
        .flush()
        .await
        .map_err(|e| RelayError::transfer(TransferStage::Write, session.bytes, e))?;

    let throttle = tap.sink_mut();
    throttle.flush(ProgressEvent::of(session.bytes, total));
    if let Some(event) = throttle.get_mut().take() {
        status.update(&text::uploading(event)).await;
    }
    Ok(())
}
