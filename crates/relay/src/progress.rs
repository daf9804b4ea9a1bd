use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, ReadBuf};

/// A progress update for a body being streamed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Percentage of the declared total, in `[0, 100]`.
    Percent(f64),
    /// The total is unknown; only the byte count so far is available.
    Indeterminate { bytes: u64 },
}

impl ProgressEvent {
    /// Progress of `bytes` against an optional declared `total`.
    #[must_use]
    pub fn of(bytes: u64, total: Option<u64>) -> Self {
        match total {
            Some(total) if total > 0 => Self::Percent(percent(bytes, total)),
            _ => Self::Indeterminate { bytes },
        }
    }
}

fn percent(bytes: u64, total: u64) -> f64 {
    (bytes as f64 / total as f64 * 100.0).min(100.0)
}

/// Receiver of progress events.
pub trait ProgressSink {
    fn on_progress(&mut self, event: ProgressEvent);
}

/// Keeps the latest event that reached it until it is taken.
#[derive(Debug, Default)]
pub struct PendingProgress {
    latest: Option<ProgressEvent>,
}

impl PendingProgress {
    pub fn take(&mut self) -> Option<ProgressEvent> {
        self.latest.take()
    }
}

impl ProgressSink for PendingProgress {
    fn on_progress(&mut self, event: ProgressEvent) {
        self.latest = Some(event);
    }
}

/// Byte-counting pass-through over an [`AsyncRead`].
///
/// Every successful read is forwarded untouched. When the declared total is
/// known and non-zero, the sink also receives the cumulative percentage after
/// each read; with an unknown total the sink is never called.
#[derive(Debug)]
pub struct ProgressTap<R, S> {
    inner: R,
    total: Option<u64>,
    bytes_read: u64,
    sink: S,
}

impl<R, S> ProgressTap<R, S> {
    pub fn new(inner: R, total: Option<u64>, sink: S) -> Self {
        Self {
            inner,
            total,
            bytes_read: 0,
            sink,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (R, S) {
        (self.inner, self.sink)
    }
}

impl<R, S: ProgressSink> ProgressTap<R, S> {
    fn record(&mut self, n: usize) {
        self.bytes_read += n as u64;
        if let Some(total) = self.total.filter(|total| *total > 0) {
            self.sink
                .on_progress(ProgressEvent::Percent(percent(self.bytes_read, total)));
        }
    }
}

impl<R, S> AsyncRead for ProgressTap<R, S>
where
    R: AsyncRead + Unpin,
    S: ProgressSink + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = buf.filled().len() - before;
            this.record(n);
        }
        poll
    }
}
