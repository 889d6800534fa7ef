use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use super::ClientError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Opens one SSE byte stream. The reconnecting client calls it again after
/// every failure.
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<ByteStream, ClientError>;
}

/// Connects to `GET {base}/api/events` with the token in the query string.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(HttpTransport {
            client,
            url: events_url(base_url, token),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub fn events_url(base_url: &str, token: &str) -> String {
    format!(
        "{}/api/events?token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn connect(&self) -> Result<ByteStream, ClientError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encodes_token_and_trims_slash() {
        assert_eq!(
            events_url("http://localhost:8080/", "a.b+c/d"),
            "http://localhost:8080/api/events?token=a.b%2Bc%2Fd"
        );
    }

    #[test]
    fn transport_keeps_url() {
        let transport = HttpTransport::new("http://example.com", "tok").unwrap();
        assert_eq!(transport.url(), "http://example.com/api/events?token=tok");
    }
}
