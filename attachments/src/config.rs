use std::{env, str::FromStr, time::Duration};

use crate::download::DEFAULT_MAX_BYTES;

/// Absolute ceiling on attachments per request, whatever the env says.
pub const HARD_MAX_FILES: usize = 3;

#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    /// Attachments processed per request (clamped to `1..=HARD_MAX_FILES`).
    pub max_files: usize,
    /// Per-file budget covering download and understanding.
    pub timeout: Duration,
    pub max_bytes: u64,
    /// Allows loopback/private hosts (local development and tests).
    pub allow_private_hosts: bool,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_files: 2,
            timeout: Duration::from_secs(30),
            max_bytes: DEFAULT_MAX_BYTES,
            allow_private_hosts: false,
        }
    }
}

impl AttachmentConfig {
    /// `MAX_FILE_URLS`, `ATTACH_TIMEOUT_SECS`, `ATTACH_MAX_BYTES`, `ATTACH_ALLOW_PRIVATE_HOSTS`.
    ///
    /// Unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_files: parse("MAX_FILE_URLS", d.max_files).clamp(1, HARD_MAX_FILES),
            timeout: Duration::from_secs(parse("ATTACH_TIMEOUT_SECS", d.timeout.as_secs()).max(1)),
            max_bytes: parse("ATTACH_MAX_BYTES", d.max_bytes),
            allow_private_hosts: parse("ATTACH_ALLOW_PRIVATE_HOSTS", false),
        }
    }

    pub fn effective_max_files(&self) -> usize {
        self.max_files.clamp(1, HARD_MAX_FILES)
    }
}

fn parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
