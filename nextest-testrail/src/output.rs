// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log output.
//!
//! Log lines are written to stderr, prefixed with `[testrail]` so that they stand out from the
//! output of the test runner. The `NEXTEST_TESTRAIL_LOG` environment variable selects what is
//! logged, with the syntax of [`Targets`] (e.g. `debug` or `nextest_testrail=trace`).

use owo_colors::{OwoColorize, Style, style};
use std::fmt;
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
    warn,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// The environment variable used to configure logging.
pub const LOG_ENV: &str = "NEXTEST_TESTRAIL_LOG";

/// The prefix of every log line.
pub const LOG_PREFIX: &str = "[testrail]";

/// Whether log output is colored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Color {
    /// Color if stderr supports it.
    #[default]
    Auto,

    /// Always color.
    Always,

    /// Never color.
    Never,
}

impl Color {
    fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

static INIT_LOGGER: std::sync::Once = std::sync::Once::new();

/// Installs the global logger.
///
/// Only the first call has an effect. Does nothing if another global logger is already installed.
pub fn init_logging(color: Color) {
    INIT_LOGGER.call_once(|| {
        let (targets, invalid) = parse_targets(std::env::var(LOG_ENV).ok().as_deref());
        let layer = make_layer(color.should_colorize(supports_color::Stream::Stderr), std::io::stderr)
            .with_filter(targets);

        if tracing_subscriber::registry().with(layer).try_init().is_ok()
            && let Some(invalid) = invalid
        {
            warn!("ignoring invalid {LOG_ENV} value `{invalid}`, logging at INFO");
        }
    });
}

/// Parses a filter, falling back to INFO if it is unset or invalid. Returns the invalid input, if
/// any.
fn parse_targets(input: Option<&str>) -> (Targets, Option<String>) {
    let default = || Targets::new().with_default(LevelFilter::INFO);
    match input.map(str::trim) {
        None | Some("") => (default(), None),
        Some(input) => match input.parse() {
            Ok(targets) => (targets, None),
            Err(_) => (default(), Some(input.to_owned())),
        },
    }
}

fn make_layer<S, W>(colorize: bool, make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    let mut styles = LogStyles::default();
    if colorize {
        styles.colorize();
    }
    tracing_subscriber::fmt::layer()
        .event_format(PrefixFormatter { styles })
        .with_writer(make_writer)
}

struct PrefixFormatter {
    styles: LogStyles,
}

impl<S, N> FormatEvent<S, N> for PrefixFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{} ", LOG_PREFIX.style(self.styles.prefix))?;
        match *event.metadata().level() {
            Level::ERROR => write!(writer, "{}: ", "error".style(self.styles.error))?,
            Level::WARN => write!(writer, "{}: ", "warning".style(self.styles.warning))?,
            Level::INFO => write!(writer, "{}: ", "info".style(self.styles.info))?,
            Level::DEBUG => write!(writer, "{}: ", "debug".style(self.styles.debug))?,
            Level::TRACE => write!(writer, "{}: ", "trace".style(self.styles.trace))?,
        }

        let mut visitor = MessageVisitor {
            writer: &mut writer,
            error: None,
        };
        event.record(&mut visitor);
        if let Some(error) = visitor.error {
            return Err(error);
        }

        writeln!(writer)
    }
}

static MESSAGE_FIELD: &str = "message";

struct MessageVisitor<'writer, 'a> {
    writer: &'a mut format::Writer<'writer>,
    error: Option<fmt::Error>,
}

impl Visit for MessageVisitor<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD
            && let Err(error) = write!(self.writer, "{value:?}")
        {
            self.error = Some(error);
        }
    }
}

#[derive(Debug, Default)]
struct LogStyles {
    prefix: Style,
    error: Style,
    warning: Style,
    info: Style,
    debug: Style,
    trace: Style,
}

impl LogStyles {
    fn colorize(&mut self) {
        self.prefix = style().cyan();
        self.error = style().red().bold();
        self.warning = style().yellow().bold();
        self.info = style().bold();
        self.debug = style().bold();
        self.trace = style().dimmed();
    }
}
