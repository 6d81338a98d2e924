//! Structured JSONL logging.
//!
//! Nothing here writes to stdout: the statistics table and `--json` output
//! own it. Log records go to a daily-rolled file, or to stderr when no log
//! location is writable.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::Event;
use tracing::field::{Field, Visit};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_LOG_PATH: &str = "TALLY_LOG_PATH";
const ENV_LOG_DIR: &str = "TALLY_LOG_DIR";
const LOG_FILE_SUFFIX: &str = ".jsonl";

/// Where log records should go, before environment overrides are applied.
#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    /// Name written into file names.
    pub service: String,
    /// `log_dir` from the configuration file.
    pub log_dir: Option<PathBuf>,
}

impl ObservabilityConfig {
    /// Config for this binary, with the configured log directory.
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self {
            service: env!("CARGO_PKG_NAME").to_string(),
            log_dir,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogTarget {
    dir: PathBuf,
    file_name: String,
}

impl LogTarget {
    fn in_dir(dir: PathBuf, service: &str) -> Self {
        Self {
            dir,
            file_name: format!("{service}{LOG_FILE_SUFFIX}"),
        }
    }

    fn from_path(path: &Path) -> Result<Self> {
        let Some(file_name) = path.file_name() else {
            bail!("{ENV_LOG_PATH} must include a file name");
        };
        let Some(file_name) = file_name.to_str() else {
            bail!("{ENV_LOG_PATH} must be valid UTF-8");
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            dir: dir.to_path_buf(),
            file_name: file_name.to_string(),
        })
    }

    #[cfg(test)]
    fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Create the directory and open the file once to prove it is writable.
    fn ensure_writable(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create log directory {}", self.dir.display()))?;
        let path = self.dir.join(&self.file_name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(())
    }
}

/// Keeps the background log writer alive; hold it until exit.
pub struct ObservabilityGuard {
    _log_guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Currently infallible; an unwritable log location falls back to stderr.
pub fn init_observability(
    cfg: &ObservabilityConfig,
    env_filter: EnvFilter,
) -> Result<ObservabilityGuard> {
    let (writer, guard) = match log_writer(cfg) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("Warning: {err:#}. Logging to stderr.");
            tracing_appender::non_blocking(std::io::stderr())
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(JsonLogLayer::new(writer))
        .init();

    tracing::debug!("observability initialized");
    Ok(ObservabilityGuard { _log_guard: guard })
}

/// Filter from CLI flags and environment.
///
/// Priority: `--quiet`, then `-v`/`-vv`, then `RUST_LOG`, then the configured level.
pub fn env_filter(quiet: bool, verbose: u8, default_level: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

fn log_writer(cfg: &ObservabilityConfig) -> Result<(NonBlocking, WorkerGuard)> {
    let target = resolve_log_target(
        &cfg.service,
        std::env::var_os(ENV_LOG_PATH).map(PathBuf::from),
        std::env::var_os(ENV_LOG_DIR).map(PathBuf::from),
        cfg.log_dir.clone(),
    )?;
    let appender = tracing_appender::rolling::daily(&target.dir, &target.file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Pick the log target: explicit path, then env dir, then configured dir,
/// then the first writable platform default.
fn resolve_log_target(
    service: &str,
    path_override: Option<PathBuf>,
    dir_override: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> Result<LogTarget> {
    let explicit = match (path_override, dir_override.or(config_dir)) {
        (Some(path), _) => Some(LogTarget::from_path(&path)?),
        (None, Some(dir)) => Some(LogTarget::in_dir(dir, service)),
        (None, None) => None,
    };
    if let Some(target) = explicit {
        target.ensure_writable()?;
        return Ok(target);
    }

    let candidates = tally_core::config::user_data_local_dir()
        .map(|dir| dir.into_std_path_buf().join("logs"))
        .into_iter()
        .chain(std::env::current_dir().ok());

    for dir in candidates {
        let target = LogTarget::in_dir(dir, service);
        if target.ensure_writable().is_ok() {
            return Ok(target);
        }
    }
    bail!("no writable log directory found")
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Writes each event as one JSON object per line, with the fields of every
/// enclosing span merged in.
struct JsonLogLayer<W> {
    writer: W,
}

impl<W> JsonLogLayer<W> {
    const fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[derive(Clone, Debug)]
struct SpanFields(Map<String, Value>);

impl<S, W> tracing_subscriber::Layer<S> for JsonLogLayer<W>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: LayerContext<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            let mut visitor = JsonVisitor::default();
            attrs.record(&mut visitor);
            span.extensions_mut().insert(SpanFields(visitor.0));
        }
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: LayerContext<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = JsonVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(fields) => fields.0.extend(visitor.0),
            None => extensions.insert(SpanFields(visitor.0)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        let meta = event.metadata();
        let mut record = Map::new();
        record.insert("timestamp".into(), Value::String(timestamp()));
        record.insert(
            "level".into(),
            Value::String(meta.level().as_str().to_lowercase()),
        );
        record.insert("target".into(), Value::String(meta.target().to_string()));

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    record.extend(fields.0.clone());
                }
            }
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        record.extend(visitor.0);

        let mut writer = self.writer.make_writer();
        if serde_json::to_writer(&mut writer, &Value::Object(record)).is_ok() {
            let _ = writer.write_all(b"\n");
        }
    }
}

#[derive(Default)]
struct JsonVisitor(Map<String, Value>);

impl JsonVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(number) = serde_json::Number::from_f64(value) {
            self.put(field, Value::Number(number));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{value:?}")));
    }
}
