use std::time::Duration;

use tokio::time::Instant;

use crate::progress::{ProgressEvent, ProgressSink};

/// Rate limiter in front of a [`ProgressSink`].
///
/// Events reach the inner sink at most once per `interval`; the rest are
/// dropped, not buffered. The clock starts at construction, so the first
/// event is forwarded only once a full interval has passed. [`flush`] always
/// forwards and restarts the clock.
///
/// [`flush`]: Throttle::flush
#[derive(Debug)]
pub struct Throttle<S> {
    interval: Duration,
    last_fired: Instant,
    sink: S,
}

impl<S: ProgressSink> Throttle<S> {
    pub fn new(interval: Duration, sink: S) -> Self {
        Self {
            interval,
            last_fired: Instant::now(),
            sink,
        }
    }

    /// Forward `event` regardless of the interval.
    pub fn flush(&mut self, event: ProgressEvent) {
        self.fire(event);
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    fn fire(&mut self, event: ProgressEvent) {
        self.sink.on_progress(event);
        self.last_fired = Instant::now();
    }
}

impl<S: ProgressSink> ProgressSink for Throttle<S> {
    fn on_progress(&mut self, event: ProgressEvent) {
        if self.last_fired.elapsed() >= self.interval {
            self.fire(event);
        }
    }
}
