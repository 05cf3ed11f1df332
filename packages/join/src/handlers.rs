//! Output sinks for joined records.
//!
//! A sink is shared by every stripe worker, so `handle` must be safe
//! under concurrent invocation: each sink owns one mutex-wrapped writer
//! and emits a whole line per call, so concurrent workers never tear a
//! record. `stripe_done` flushes buffered output without closing the
//! destination; only `all_done` releases it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::{Mutex, PoisonError};

use gazetteer_striper::store::StripeKey;

/// Errors from the output destination.
///
/// Always fatal for the run: a partially written index is worse than an
/// aborted one.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// I/O failure on the destination.
    #[error("sink write failure: {0}")]
    Write(#[from] std::io::Error),
}

/// Destination for joined records, shared across stripe workers.
pub trait JoinOutHandler: Send + Sync {
    /// Emits one joined record line. Thread-safe.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be written.
    fn handle(&self, line: &str, stripe: StripeKey) -> Result<(), SinkError>;

    /// Flushes buffered output after one stripe completes, without
    /// closing the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn stripe_done(&self, stripe: StripeKey) -> Result<(), SinkError>;

    /// Flushes and releases the destination at global completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn all_done(&self) -> Result<(), SinkError>;
}

/// File- or stream-backed sink: the default destination is standard
/// output, `options[0]` switches to a file path.
pub struct PrintJoinOutHandler {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
}

impl PrintJoinOutHandler {
    /// Builds a sink from its option list.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination file cannot be created.
    pub fn from_options(options: &[String]) -> Result<Self, SinkError> {
        let target: Box<dyn Write + Send> = match options.first() {
            Some(path) => Box::new(File::create(path)?),
            None => Box::new(std::io::stdout()),
        };

        Ok(Self {
            writer: Mutex::new(BufWriter::new(target)),
        })
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, BufWriter<Box<dyn Write + Send>>> {
        // A worker that panicked mid-handle aborts the run anyway, so a
        // poisoned lock can safely hand over the inner writer.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JoinOutHandler for PrintJoinOutHandler {
    fn handle(&self, line: &str, _stripe: StripeKey) -> Result<(), SinkError> {
        let mut writer = self.locked();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn stripe_done(&self, stripe: StripeKey) -> Result<(), SinkError> {
        log::debug!("stripe {stripe} done, flushing sink");
        self.locked().flush()?;
        Ok(())
    }

    fn all_done(&self) -> Result<(), SinkError> {
        self.locked().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufRead as _;

    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("gazetteer_sink_test_{name}"));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn writes_lines_to_file_destination() {
        let path = scratch_path("file_dest");
        let sink =
            PrintJoinOutHandler::from_options(&[path.display().to_string()]).unwrap();

        let stripe = StripeKey { x: 0, y: 0 };
        sink.handle("{\"id\":\"a\"}", stripe).unwrap();
        sink.handle("{\"id\":\"b\"}", stripe).unwrap();
        sink.stripe_done(stripe).unwrap();
        sink.all_done().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"id\":\"a\"}\n{\"id\":\"b\"}\n");
    }

    #[test]
    fn concurrent_handles_never_tear_lines() {
        let path = scratch_path("concurrent");
        let sink =
            PrintJoinOutHandler::from_options(&[path.display().to_string()]).unwrap();

        let a_line = "a".repeat(512);
        let b_line = "b".repeat(512);

        let sink_ref = &sink;
        std::thread::scope(|scope| {
            for line in [&a_line, &b_line] {
                scope.spawn(move || {
                    for _ in 0..200 {
                        sink_ref.handle(line, StripeKey { x: 0, y: 0 }).unwrap();
                    }
                });
            }
        });
        sink.all_done().unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let mut count = 0;
        for line in std::io::BufReader::new(file).lines() {
            let line = line.unwrap();
            assert!(line == a_line || line == b_line, "torn line: {line}");
            count += 1;
        }
        assert_eq!(count, 400);
    }
}
