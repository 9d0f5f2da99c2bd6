use chrono::Local;
use colored::*;
use std::fmt::Write as _;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber with colorized, service-tagged output.
///
/// `RUST_LOG` controls the filter (default: `info`). Calling this more than
/// once is harmless; later calls leave the first subscriber in place.
pub fn init_logging(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Force colored output even if not a TTY
    colored::control::set_override(true);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_writer(std::io::stdout)
        .event_format(ServiceFormatter {
            service: service.to_string(),
        })
        .try_init();
}

struct ServiceFormatter {
    service: String,
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ServiceFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        let level_str = level_tag(*event.metadata().level());

        write!(
            writer,
            "{} {} {} ",
            now.dimmed(),
            level_str,
            format!("[{}]", self.service).cyan()
        )?;

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        write!(writer, "{}", visitor.message)?;
        if !visitor.fields.is_empty() {
            write!(writer, " {}", visitor.fields.dimmed())?;
        }
        writeln!(writer)
    }
}

fn level_tag(level: tracing::Level) -> String {
    match level {
        tracing::Level::ERROR => "ERROR".red().bold().to_string(),
        tracing::Level::WARN => " WARN".yellow().bold().to_string(),
        tracing::Level::INFO => " INFO".green().bold().to_string(),
        tracing::Level::DEBUG => "DEBUG".blue().bold().to_string(),
        tracing::Level::TRACE => "TRACE".magenta().bold().to_string(),
    }
}

/// Collects the `message` field verbatim and renders every other field as `key=value`.
#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: String,
}

impl FieldVisitor {
    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }
}
