use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Targets of the workspace crates. Events from other crates (hyper, reqwest, ...)
/// are left to the global filter and not rendered by [`layer`].
pub const WORKSPACE_TARGETS: &[&str] = &[
    "answer_backend",
    "ai_llm_service",
    "api",
    "attachments",
    "contextor",
    "rag_store",
    "services",
];

/// RFC3339 UTC timer, e.g. `2025-09-12T10:20:30Z`.
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        let s = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

fn is_workspace_target(target: &str) -> bool {
    WORKSPACE_TARGETS
        .iter()
        .any(|p| target == *p || target.starts_with(&format!("{p}::")))
}

/// Formatting layer that renders only events emitted by workspace crates.
///
/// - RFC3339 UTC timestamps
/// - Compact single-line format with `file:line`
/// - Span close events (durations of instrumented functions)
/// - ANSI colors only when stdout is a terminal
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let use_ansi = io::stdout().is_terminal();
    let only_workspace = filter::filter_fn(|meta| is_workspace_target(meta.target()));

    fmt::layer()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(use_ansi)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .event_format(fmt::format().compact().with_source_location(true))
        .with_filter(only_workspace)
}

/// Per-crate level directives for every workspace target.
pub fn level_directives(level: Level) -> Vec<Directive> {
    let lvl = level.as_str().to_lowercase();
    WORKSPACE_TARGETS
        .iter()
        .filter_map(|t| format!("{t}={lvl}").parse().ok())
        .collect()
}

/// `RUST_LOG` if set, else `default`; workspace crates are raised to `level`.
///
/// An unparsable `default` falls back to `info`.
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let base = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    level_directives(level)
        .into_iter()
        .fold(base, |f, d| f.add_directive(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_targets_match_module_paths() {
        assert!(is_workspace_target("contextor::orchestrator"));
        assert!(is_workspace_target("api"));
        assert!(!is_workspace_target("apix::thing"));
        assert!(!is_workspace_target("hyper::proto"));
    }

    #[test]
    fn directives_cover_every_crate() {
        assert_eq!(level_directives(Level::DEBUG).len(), WORKSPACE_TARGETS.len());
    }
}
