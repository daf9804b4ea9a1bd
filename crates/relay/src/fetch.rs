use std::io;

use {
    async_trait::async_trait,
    futures::TryStreamExt,
    reqwest::header::{CONTENT_LENGTH, HeaderMap},
    tokio::io::AsyncRead,
    tokio_util::io::StreamReader,
    tracing::debug,
    url::Url,
};

use crate::error::FetchError;

/// Body of a GET response as a plain byte reader.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// An opened response body with the length the server declared, if any.
pub struct FetchedBody {
    pub reader: BodyReader,
    pub declared_len: Option<u64>,
}

impl std::fmt::Debug for FetchedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedBody")
            .field("declared_len", &self.declared_len)
            .finish_non_exhaustive()
    }
}

/// Network surface the relay needs.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Metadata-only probe returning the declared content length.
    async fn head(&self, url: &Url) -> Result<Option<u64>, FetchError>;

    /// Open the body for streaming.
    async fn get(&self, url: &Url) -> Result<FetchedBody, FetchError>;
}

/// [`Fetcher`] over a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

/// The `Content-Length` header as sent by the server.
///
/// `Response::content_length` reports the size of the body actually
/// received, which is zero for HEAD responses.
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn check_status(response: &reqwest::Response, url: &Url) -> Result<(), FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::status(status.as_u16(), url))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn head(&self, url: &Url) -> Result<Option<u64>, FetchError> {
        let response = self.client.head(url.clone()).send().await?;
        check_status(&response, url)?;
        let declared = declared_length(response.headers());
        debug!(%url, ?declared, "probed remote resource");
        Ok(declared)
    }

    async fn get(&self, url: &Url) -> Result<FetchedBody, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        check_status(&response, url)?;
        let declared_len = declared_length(response.headers()).or(response.content_length());
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(FetchedBody {
            reader: Box::new(StreamReader::new(Box::pin(stream))),
            declared_len,
        })
    }
}
