use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::targets::{T_CTRL, T_DETECT, T_WIFI};

/// Keeps the non-blocking file writers alive; hold for the process lifetime.
pub struct LoggingGuards {
    _file_guards: Vec<WorkerGuard>,
}

impl LoggingGuards {
    pub fn file_logging(&self) -> bool {
        !self._file_guards.is_empty()
    }
}

pub fn init(component: &str, root: &Path, cfg: &LoggingConfig) -> Result<LoggingGuards> {
    let filter = build_filter(cfg);

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .compact();

    let log_dir = root.join("logs");
    let mut guards = Vec::new();
    let mut warn_msg: Option<String> = None;

    let (component_layer, verdict_layer, ctrl_layer, capture_layer) = if cfg.enabled && cfg.file {
        match std::fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let appender =
                    tracing_appender::rolling::daily(&log_dir, format!("{component}.log"));
                let (writer, guard) = tracing_appender::non_blocking(appender);
                guards.push(guard);
                let component_layer = fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .compact()
                    .with_writer(writer);

                let (verdict_layer, guard) = subsystem_layer(&log_dir, "verdicts.log", T_DETECT);
                guards.push(guard);
                let (ctrl_layer, guard) = subsystem_layer(&log_dir, "ctrl.log", T_CTRL);
                guards.push(guard);
                let (capture_layer, guard) = subsystem_layer(&log_dir, "capture.log", T_WIFI);
                guards.push(guard);

                (
                    Some(component_layer),
                    Some(verdict_layer),
                    Some(ctrl_layer),
                    Some(capture_layer),
                )
            }
            Err(err) => {
                warn_msg = Some(format!(
                    "File logging disabled ({}): {}",
                    log_dir.display(),
                    err
                ));
                (None, None, None, None)
            }
        }
    } else {
        (None, None, None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(component_layer)
        .with(verdict_layer)
        .with(ctrl_layer)
        .with(capture_layer)
        .try_init()
        .ok();
    let _ = LogTracer::init();

    if let Some(message) = warn_msg {
        tracing::warn!("{message}");
    }

    Ok(LoggingGuards {
        _file_guards: guards,
    })
}

/// `RUST_LOG` wins over the configured level when it parses.
pub(crate) fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    if !cfg.enabled {
        return EnvFilter::new("off");
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(cfg.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn subsystem_layer<S>(
    log_dir: &Path,
    filename: &str,
    target: &'static str,
) -> (impl Layer<S> + Send + Sync, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(log_dir, filename);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .compact()
        .with_writer(writer)
        .with_filter(Targets::new().with_target(target, LevelFilter::TRACE));
    (layer, guard)
}
