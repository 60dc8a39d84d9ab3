use std::{fs, path::Path, sync::OnceLock};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;
pub mod writer;

pub use formatter::*;
pub use writer::*;

use crate::configs::{Config, LoggingConfig};

pub(crate) static GLOBAL_FILE_WRITER: OnceLock<CircularFileWriter> = OnceLock::new();

/// Prints to stdout and mirrors the line into the log file, if one is configured.
#[macro_export]
macro_rules! log_println {
    () => {{
        std::println!();
        $crate::common::logger::append_to_file_raw("\n");
    }};
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        std::println!("{}", msg);
        $crate::common::logger::append_to_file_raw(&format!("{}\n", msg));
    }};
}

pub fn append_to_file_raw(msg: &str) {
    if let Some(mut writer) = GLOBAL_FILE_WRITER.get().cloned() {
        use std::io::Write;
        let _ = writer.write_all(strip_ansi_escapes(msg).as_bytes());
    }
}

/// Builds the filter directive string from the logging section.
///
/// Chatty dependency targets are capped at `warn` unless the config names them.
pub fn filter_directives(logging: Option<&LoggingConfig>) -> String {
    let level = logging
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");
    let extra = logging
        .and_then(|l| l.filters.as_deref())
        .unwrap_or("");

    let base = format!("{},hyper=warn,tungstenite=warn,tokio_tungstenite=warn", level);
    if extra.is_empty() {
        base
    } else {
        format!("{},{}", base, extra)
    }
}

pub fn init(config: &Config) {
    let logging = config.logging.as_ref();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(logging)));

    let stdout_layer = fmt::layer()
        .event_format(CustomFormatter::new(true))
        .with_ansi(true);

    let file_layer = logging.and_then(|l| l.file.as_ref()).map(|file_config| {
        if let Some(parent) = Path::new(&file_config.path).parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Failed to create log directory: {}", e);
            }
        }

        let writer = CircularFileWriter::new(file_config.path.clone(), file_config.max_lines);
        let _ = GLOBAL_FILE_WRITER.set(writer.clone());
        fmt::layer()
            .with_writer(writer)
            .event_format(CustomFormatter::new(false))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Minimal stdout-only logging for the client binary.
pub fn init_plain(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .event_format(CustomFormatter::new(true))
                .with_ansi(true),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_default_to_info() {
        assert_eq!(
            filter_directives(None),
            "info,hyper=warn,tungstenite=warn,tokio_tungstenite=warn"
        );
    }

    #[test]
    fn directives_append_configured_filters() {
        let logging = LoggingConfig {
            level: Some("debug".into()),
            filters: Some("listenroom::room=trace".into()),
            file: None,
        };
        let directives = filter_directives(Some(&logging));
        assert!(directives.starts_with("debug,"));
        assert!(directives.ends_with(",listenroom::room=trace"));
    }
}
