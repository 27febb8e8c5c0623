// ── Report sink ──
//
// Line-oriented diagnostic output. Every line carries a severity prefix;
// the sink is stdout unless a file or device path is given.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Severity {
    #[strum(serialize = "PASS")]
    Pass,
    #[strum(serialize = "INFO")]
    Info,
    #[strum(serialize = "WARNING")]
    Warning,
    #[strum(serialize = "ERROR")]
    Error,
}

pub struct Report {
    out: Box<dyn Write + Send>,
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report").finish_non_exhaustive()
    }
}

impl Report {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Append to `path`, creating it if needed.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }

    pub fn line(&mut self, severity: Severity, msg: impl fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{severity}: {msg}")?;
        self.out.flush()
    }

    pub fn pass(&mut self, msg: impl fmt::Display) -> io::Result<()> {
        self.line(Severity::Pass, msg)
    }

    pub fn info(&mut self, msg: impl fmt::Display) -> io::Result<()> {
        self.line(Severity::Info, msg)
    }

    pub fn warn(&mut self, msg: impl fmt::Display) -> io::Result<()> {
        self.line(Severity::Warning, msg)
    }

    pub fn error(&mut self, msg: impl fmt::Display) -> io::Result<()> {
        self.line(Severity::Error, msg)
    }

    /// Write unprefixed text, e.g. a decoded PAC script or a separator.
    pub fn raw(&mut self, text: impl fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }
}

/// Cloneable in-memory sink; every clone sees the same bytes.
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
