//! Local diagnostics: formatter, color handling, and tracing setup.

mod debug;

pub use debug::DebugProbe;

use std::io::IsTerminal;
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::bus::{Envelope, TelemetryTarget};

pub const TAG_COLOR: &str = "\x1b[42m"; // green background, execution tags
pub const FAULT_COLOR: &str = "\x1b[41m"; // red background, fault tags
pub const DETAIL_COLOR: &str = "\x1b[34m"; // blue, timing details
pub const RESET_COLOR: &str = "\x1b[0m";

/// Formatter color mode for telemetry output.
///
/// - [`FormatterMode::Auto`]: detects TTY capability via `stderr.is_terminal()`
/// - [`FormatterMode::Colored`]: always include color codes
/// - [`FormatterMode::Plain`]: never include color codes (logs/files)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    #[default]
    Auto,
    Colored,
    Plain,
}

impl FormatterMode {
    /// Returns true if this mode should use colored output.
    ///
    /// For `Auto` mode, performs TTY detection on each call.
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Renders telemetry envelopes for human-facing sinks.
pub trait TelemetryFormatter: Send + Sync {
    fn render_envelope(&self, envelope: &Envelope) -> String;
}

/// Plain text formatter with optional ANSI color codes.
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    /// Formatter with auto-detected color mode.
    pub fn new() -> Self {
        Self {
            mode: FormatterMode::Auto,
        }
    }

    /// Formatter with explicit color mode.
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }

    fn tag_color(&self, target: TelemetryTarget) -> &'static str {
        match target {
            TelemetryTarget::Debug | TelemetryTarget::Trace => TAG_COLOR,
            _ => DETAIL_COLOR,
        }
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_envelope(&self, envelope: &Envelope) -> String {
        let body = serde_json::to_string(&envelope.data).unwrap_or_default();
        if self.mode.is_colored() {
            format!(
                "{} {} {RESET_COLOR} {body}\n",
                self.tag_color(envelope.target),
                envelope.target
            )
        } else {
            format!("[{}] {body}\n", envelope.target)
        }
    }
}

/// Install the worker's tracing subscriber: env-filter (default `info`),
/// compact fmt output, and an [`ErrorLayer`] for span-traced errors.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .with(ErrorLayer::default())
        .try_init();
}
