//! Bounded HTTP download of attachment URLs.
//!
//! Only `http`/`https` URLs are fetched. Loopback, private and link-local IP
//! literals (and `localhost`) are refused unless `allow_private_hosts` is set.
//! The body is streamed and the download stops as soon as it exceeds `max_bytes`.

use std::{net::IpAddr, time::Duration};

use futures::StreamExt;
use reqwest::{Url, header::CONTENT_TYPE};
use tracing::debug;

use crate::{
    errors::{AttachmentError, Result},
    mime,
};

pub const DEFAULT_MAX_BYTES: u64 = 12 * 1024 * 1024;

/// A fully downloaded attachment.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub url: String,
    pub name: String,
    /// Resolved media type (declared, else guessed from the URL).
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    max_bytes: u64,
    allow_private_hosts: bool,
}

impl Downloader {
    pub fn new(timeout: Duration, max_bytes: u64, allow_private_hosts: bool) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_bytes,
            allow_private_hosts,
        })
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Checks scheme and host without touching the network.
    pub fn validate_url(&self, url: &str) -> Result<Url> {
        let parsed = Url::parse(url.trim()).map_err(|e| AttachmentError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AttachmentError::InvalidUrl(format!(
                "only http/https URLs are allowed: {url}"
            )));
        }
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AttachmentError::InvalidUrl(format!("missing host: {url}")))?;

        if !self.allow_private_hosts && is_private_host(host) {
            return Err(AttachmentError::BlockedHost(host.to_string()));
        }
        Ok(parsed)
    }

    pub async fn download(&self, url: &str) -> Result<Downloaded> {
        let parsed = self.validate_url(url)?;
        let resp = self.client.get(parsed).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AttachmentError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if resp.content_length().is_some_and(|n| n > self.max_bytes) {
            return Err(AttachmentError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let declared = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes: Vec<u8> = Vec::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(AttachmentError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        let mime = mime::resolve(declared.as_deref(), url);
        debug!(url, mime = %mime, bytes = bytes.len(), "attachment downloaded");
        Ok(Downloaded {
            url: url.to_string(),
            name: mime::filename_from_url(url),
            mime,
            bytes,
        })
    }
}

fn is_private_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
        }
        Ok(IpAddr::V6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn downloader(max: u64) -> Downloader {
        Downloader::new(Duration::from_secs(5), max, true).unwrap()
    }

    #[test]
    fn rejects_non_http_and_private_hosts() {
        let strict = Downloader::new(Duration::from_secs(1), 10, false).unwrap();
        assert!(matches!(
            strict.validate_url("ftp://files.test/a.txt"),
            Err(AttachmentError::InvalidUrl(_))
        ));
        assert!(matches!(
            strict.validate_url("http://127.0.0.1:8080/a.txt"),
            Err(AttachmentError::BlockedHost(_))
        ));
        assert!(matches!(
            strict.validate_url("http://192.168.1.4/a.txt"),
            Err(AttachmentError::BlockedHost(_))
        ));
        assert!(strict.validate_url("https://files.test/a.txt").is_ok());
    }

    #[tokio::test]
    async fn downloads_and_resolves_mime() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/notes.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain; charset=utf-8")
                    .set_body_string("hello"),
            )
            .mount(&server)
            .await;

        let d = downloader(1024)
            .download(&format!("{}/docs/notes.txt", server.uri()))
            .await
            .unwrap();
        assert_eq!(d.name, "notes.txt");
        assert_eq!(d.mime, "text/plain");
        assert_eq!(d.bytes, b"hello");
    }

    #[tokio::test]
    async fn oversize_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64]))
            .mount(&server)
            .await;

        let err = downloader(16)
            .download(&format!("{}/big.bin", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::TooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = downloader(16)
            .download(&format!("{}/missing.pdf", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "HttpStatus");
    }
}
