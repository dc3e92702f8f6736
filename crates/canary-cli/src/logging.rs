//! Tracing setup for the `canary` binary.
//!
//! Console output goes to stderr (text or JSON). Every event is also
//! appended to the session log file once the session id is known.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::LogFormat;

const DEFAULT_FILTER: &str = "info,canary=debug";

/// Append-only log file for the running session.
///
/// Events emitted before [`SessionLog::open`] only reach stderr.
#[derive(Clone, Default)]
pub struct SessionLog {
    file: Arc<Mutex<Option<File>>>,
}

impl SessionLog {
    pub fn open(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *self.file() = Some(file);
        Ok(())
    }

    fn file(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SessionLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SessionLog {
    type Writer = SessionLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init(format: LogFormat) -> anyhow::Result<SessionLog> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;
    let session_log = SessionLog::default();

    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer().with_writer(io::stderr)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_writer(io::stderr))),
    };
    let file = fmt::layer()
        .with_ansi(false)
        .with_writer(session_log.clone());

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(file)
        .try_init()?;

    Ok(session_log)
}
