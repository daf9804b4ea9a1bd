use {tracing::debug, url::Url};

use crate::{error::RelayError, fetch::Fetcher};

/// Pre-transfer size check against the attachment ceiling.
///
/// A resource is rejected only when it declares a length above the ceiling.
/// An undeclared length is let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeGate {
    ceiling: u64,
}

impl SizeGate {
    pub fn new(ceiling: u64) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Probe `url` and decide whether its body may be fetched.
    ///
    /// Returns the declared length on success.
    pub async fn check(
        &self,
        fetcher: &dyn Fetcher,
        url: &Url,
    ) -> Result<Option<u64>, RelayError> {
        let declared = fetcher
            .head(url)
            .await
            .map_err(|source| RelayError::ProbeFailed {
                url: url.to_string(),
                source,
            })?;
        self.admit(declared)
    }

    fn admit(&self, declared: Option<u64>) -> Result<Option<u64>, RelayError> {
        match declared {
            Some(declared) if declared > self.ceiling => {
                debug!(declared, ceiling = self.ceiling, "rejecting oversized resource");
                Err(RelayError::TooLarge {
                    declared,
                    ceiling: self.ceiling,
                })
            },
            other => Ok(other),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::FetchError, fetch::FetchedBody},
        async_trait::async_trait,
        rstest::rstest,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    struct ProbeStub {
        declared: Result<Option<u64>, u16>,
        gets: AtomicUsize,
    }

    impl ProbeStub {
        fn new(declared: Result<Option<u64>, u16>) -> Self {
            Self {
                declared,
                gets: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ProbeStub {
        async fn head(&self, url: &Url) -> Result<Option<u64>, FetchError> {
            self.declared.map_err(|status| FetchError::status(status, url))
        }

        async fn get(&self, _url: &Url) -> Result<FetchedBody, FetchError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedBody {
                reader: Box::new(tokio::io::empty()),
                declared_len: None,
            })
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/file.iso").unwrap()
    }

    #[rstest]
    #[case(Some(0))]
    #[case(Some(999))]
    #[case(Some(1000))]
    #[case(None)]
    #[tokio::test]
    async fn passes_sizes_within_ceiling(#[case] declared: Option<u64>) {
        let stub = ProbeStub::new(Ok(declared));
        let gate = SizeGate::new(1000);
        assert_eq!(gate.check(&stub, &url()).await.unwrap(), declared);
        assert_eq!(stub.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_oversized_without_fetching_body() {
        let stub = ProbeStub::new(Ok(Some(5_000_000_000)));
        let gate = SizeGate::new(2_000_000);

        let err = gate.check(&stub, &url()).await.unwrap_err();

        assert!(
            matches!(err, RelayError::TooLarge {
                declared: 5_000_000_000,
                ceiling: 2_000_000
            }),
            "{err:?}"
        );
        assert_eq!(stub.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_failure_is_reported() {
        let stub = ProbeStub::new(Err(503));
        let err = SizeGate::new(1000).check(&stub, &url()).await.unwrap_err();
        assert!(
            matches!(err, RelayError::ProbeFailed {
                source: FetchError::Status { status: 503, .. },
                ..
            }),
            "{err:?}"
        );
    }
}
