//! Batch extraction: bounded, ordered and tolerant of per-file failure.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use services::{
    WorkerPool,
    text::{error_summary, uniq_limit},
};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::{
    config::AttachmentConfig,
    errors::AttachmentError,
    mime,
    understanding::{DocumentUnderstanding, Understanding},
};

/// Cap on keywords/queries kept per file.
pub const MAX_TERMS_PER_FILE: usize = 30;
const MAX_ERROR_CHARS: usize = 500;

/// Outcome for one attachment URL. `error` is empty on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub url: String,
    pub name: String,
    pub mime: String,
    pub key_text: String,
    pub keywords: Vec<String>,
    pub queries: Vec<String>,
    pub error: String,
}

impl FileItem {
    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }

    fn failed(url: &str, error: String) -> Self {
        Self {
            url: url.to_string(),
            name: mime::filename_from_url(url),
            mime: mime::guess_from_url(url).to_string(),
            error,
            ..Self::default()
        }
    }
}

pub struct AttachmentExtractor {
    understanding: Arc<dyn DocumentUnderstanding>,
    pool: WorkerPool,
    cfg: AttachmentConfig,
}

impl AttachmentExtractor {
    pub fn new(understanding: Arc<dyn DocumentUnderstanding>, pool: WorkerPool, cfg: AttachmentConfig) -> Self {
        Self {
            understanding,
            pool,
            cfg,
        }
    }

    /// Non-blank, de-duplicated URLs, at most the configured file count.
    pub fn select_urls(&self, urls: &[String]) -> Vec<String> {
        uniq_limit(urls, self.cfg.effective_max_files())
    }

    /// Extracts every selected URL concurrently through the worker pool.
    ///
    /// Output order matches input order. A failing URL becomes an error-tagged
    /// item and never affects its siblings.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn extract_all(&self, urls: &[String], vision_model: Option<&str>) -> Vec<FileItem> {
        let selected = self.select_urls(urls);
        if selected.is_empty() {
            return Vec::new();
        }

        let jobs = selected.iter().map(|url| {
            let understanding = self.understanding.clone();
            let url_owned = url.clone();
            let vm = vision_model.map(str::to_string);
            let limit = self.cfg.timeout;
            let job = async move {
                match timeout(limit, understanding.understand(&url_owned, None, vm.as_deref())).await {
                    Ok(res) => res,
                    Err(_) => Err(AttachmentError::Timeout(limit)),
                }
            };
            async move {
                let res = self.pool.run(job).await.unwrap_or_else(|e| Err(e.into()));
                to_item(url, res)
            }
        });

        let items = join_all(jobs).await;
        let failed = items.iter().filter(|i| !i.is_ok()).count();
        info!(files = items.len(), failed, "attachment extraction done");
        items
    }
}

fn to_item(url: &str, res: crate::errors::Result<Understanding>) -> FileItem {
    match res {
        Ok(u) => {
            let key_text = u.text.trim().to_string();
            if key_text.is_empty() && u.keywords.is_empty() && u.queries.is_empty() {
                return FileItem::failed(url, "extract_empty_result".to_string());
            }
            FileItem {
                url: url.to_string(),
                name: mime::filename_from_url(url),
                mime: if u.mime.is_empty() {
                    mime::guess_from_url(url).to_string()
                } else {
                    u.mime
                },
                key_text,
                keywords: uniq_limit(&u.keywords, MAX_TERMS_PER_FILE),
                queries: uniq_limit(&u.queries, MAX_TERMS_PER_FILE),
                error: String::new(),
            }
        }
        Err(e) => {
            let tag = format!(
                "extract_failed: {}: {}",
                e.kind(),
                error_summary(&e.to_string(), MAX_ERROR_CHARS)
            );
            warn!(url, error = %tag, "attachment failed");
            FileItem::failed(url, tag)
        }
    }
}
