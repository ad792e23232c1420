//! Provide tracing, tailored to this program.
//!
//! The binary calls [`init_journald_or_stderr`] once at startup to install a
//! subscriber. Everything else can `use crate::tracing::prelude::*` for the
//! `trace!()`, `debug!()`, `info!()`, `warn!()`, and `error!()` macros.
//!
//! Log output goes to stderr so that the scan report printed on stdout can be
//! piped or redirected without interleaving.

use std::env;
use std::io::IsTerminal;

use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::format::Writer,
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Initialize logging.
///
/// Under systemd (for scheduled audits) events go to journald; otherwise
/// they are written to stderr. `verbose` lowers the default level from INFO
/// to DEBUG; `RUST_LOG` still takes precedence when set.
pub fn init_journald_or_stderr(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    if env::var("JOURNAL_STREAM").is_ok() {
        if let Ok(layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter(default_level))
                .with(layer)
                .init();
        } else {
            use_stderr(default_level);
            error!("Failed to initialize journald logging, using stderr.");
        }
    } else {
        use_stderr(default_level);
    }
}

fn env_filter(default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy()
}

fn use_stderr(default_level: LevelFilter) {
    let ansi = std::io::stderr().is_terminal();
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .event_format(ScanFormatter { ansi }),
        )
        .init();
}

/// One line per event: time, level, short target, message, then the
/// structured fields as `key=value` pairs.
struct ScanFormatter {
    ansi: bool,
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field.name(), format!("{:?}", value));
    }
}

impl FieldCollector {
    fn push(&mut self, name: &'static str, value: String) {
        if name == "message" {
            self.message = value;
        } else if !name.starts_with("log.") {
            self.fields.push((name, value));
        }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ScanFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        write!(writer, "{} ", local_time())?;

        let level = *event.metadata().level();
        let (color, label) = match level {
            tracing::Level::ERROR => ("31", "ERROR"),
            tracing::Level::WARN => ("33", " WARN"),
            tracing::Level::INFO => ("32", " INFO"),
            tracing::Level::DEBUG => ("34", "DEBUG"),
            tracing::Level::TRACE => ("35", "TRACE"),
        };
        if self.ansi {
            write!(writer, "\x1b[{}m{}\x1b[0m ", color, label)?;
        } else {
            write!(writer, "{} ", label)?;
        }

        let target = event.metadata().target();
        write!(
            writer,
            "{}: {}",
            target.strip_prefix("poolcensus::").unwrap_or(target),
            collector.message
        )?;

        for (name, value) in &collector.fields {
            if self.ansi {
                write!(writer, " \x1b[90m{}=\x1b[0m{}", name, value)?;
            } else {
                write!(writer, " {}={}", name, value)?;
            }
        }

        writeln!(writer)
    }
}

/// Local wall-clock time, falling back to UTC when the offset is unknown.
fn local_time() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(time::macros::format_description!(
        "[hour]:[minute]:[second]"
    ))
    .unwrap_or_default()
}
