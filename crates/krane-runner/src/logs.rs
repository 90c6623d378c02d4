//! Playbook log persistence.
//!
//! Runner output is an append-only byte stream persisted per cluster and
//! log id, so operators can fetch the full playbook transcript for any
//! past workflow. The store lays files out as `<root>/<cluster>/<id>.log`.

use crate::error::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Cloneable handle over an append-only byte sink.
///
/// Phases and the runner share one sink per workflow; writes are
/// serialized through a mutex because a phase blocks the workflow while
/// it runs, so contention is nil.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LogSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// A sink that drops everything, for tests and dry runs
    pub fn discard() -> Self {
        Self::new(std::io::sink())
    }

    /// A sink backed by a shared buffer, for tests that assert on output
    pub fn buffered() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Self {
            inner: Arc::new(Mutex::new(Box::new(SharedBuf(buf.clone())))),
        };
        (sink, buf)
    }

    pub fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.inner.lock().unwrap();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Append one line, newline-terminated
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.inner.lock().unwrap();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// File-backed store of playbook transcripts
#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, cluster: &str, id: Uuid) -> PathBuf {
        self.root.join(cluster).join(format!("{id}.log"))
    }

    /// Create (or reopen for append) the sink for one workflow's transcript
    pub fn create(&self, cluster: &str, id: Uuid) -> Result<LogSink> {
        let path = self.path(cluster, id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LogSink::new(file))
    }

    /// Read back a full transcript
    pub fn read(&self, cluster: &str, id: Uuid) -> Result<String> {
        let mut file = File::open(self.path(cluster, id))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(contents)
    }
}
