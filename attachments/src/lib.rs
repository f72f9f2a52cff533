//! Attachment understanding for grounded answers.
//!
//! - [`download::Downloader`]: bounded HTTP fetch with host checks.
//! - [`understanding::RemoteUnderstanding`]: vision for images, fast path for
//!   plain text, PDF/HTML parsers for the rest.
//! - [`extractor::AttachmentExtractor`]: ordered, failure-tolerant batch over the worker pool.
//! - [`insights::FileInsights`]: retrieval terms and the prompt's file section.

pub mod config;
pub mod download;
pub mod errors;
pub mod extractor;
pub mod insights;
pub mod keywords;
pub mod mime;
pub mod parse;
pub mod understanding;

pub use config::AttachmentConfig;
pub use download::Downloader;
pub use errors::AttachmentError;
pub use extractor::{AttachmentExtractor, FileItem};
pub use insights::FileInsights;
pub use understanding::{DocumentUnderstanding, RemoteUnderstanding, Understanding};
