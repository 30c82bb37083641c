//! Resolves image sources to raw bytes.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, Url};

use crate::config::FetchConfig;
use crate::error::{FetchError, ServiceError, ServiceResult};

use super::annotation::ImageSource;

/// Fetches remote images and passes inline bytes through.
///
/// Holds no per-request state; one instance is shared by all sessions.
#[derive(Clone)]
pub struct AssetResolver {
    client: Client,
    max_bytes: u64,
}

impl AssetResolver {
    pub fn new(config: &FetchConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_bytes: config.max_image_bytes,
        })
    }

    pub async fn resolve(&self, source: &ImageSource) -> Result<Bytes, FetchError> {
        match source {
            ImageSource::Inline(bytes) => Ok(bytes.clone()),
            ImageSource::Url(url) => self.fetch(url).await,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        tracing::debug!(url, "Fetching remote image");

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(too_large());
        }

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| request_error(url, e))?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(url, bytes = body.len(), "Fetched remote image");
        Ok(body.freeze())
    }
}

fn request_error(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            source,
        }
    }
}
