//! Tracing initialization: one fmt layer (level, target, thread id, fields) writing to stdout and,
//! optionally, appending the same output to a log file.

use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use tracing::Subscriber;
use tracing_subscriber::{
    fmt::format::FmtSpan,
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Installs the global tracing subscriber.
///
/// Level comes from `RUST_LOG` (default `info`). Load `.env` before calling this or `RUST_LOG`
/// from the file is not seen. When `log_file_path` is given, output is tee'd into that file.
pub fn init_tracing(log_file_path: Option<&str>) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match log_file_path {
        Some(path) => {
            let file = Arc::new(OpenOptions::new().create(true).append(true).open(path)?);
            BoxMakeWriter::new(io::stdout.and(file))
        }
        None => BoxMakeWriter::new(io::stdout),
    };

    Registry::default()
        .with(env_filter)
        .with(fmt_layer(writer))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}

/// Formatting shared by every destination; span closes are logged with their timings.
fn fmt_layer<S>(writer: BoxMakeWriter) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_span_close_is_logged() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = Registry::default().with(fmt_layer(BoxMakeWriter::new(move || sink.clone())));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("polling");
            let _entered = span.enter();
            tracing::info!("inside");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("inside"));
        assert!(output.contains("polling"));
        assert!(output.contains("close"));
    }

    #[test]
    fn test_unopenable_log_file_is_an_error() {
        let dir = std::env::temp_dir().join("telebot-logger-missing-dir").join("nested");
        let path = dir.join("bot.log");
        assert!(init_tracing(path.to_str()).is_err());
    }
}
