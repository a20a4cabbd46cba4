//! Append-only destinations for dump output

use std::io::Write;

use crate::error::Result;

/// Ordered, append-only consumer of SQL text fragments.
///
/// Fragments must reach the destination in call order. The engine never reads
/// a sink back.
pub trait DumpSink: Send {
    fn write(&mut self, fragment: &str) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink over any `io::Write` (files, gzip encoders, stdout)
pub struct WriteSink<W: Write + Send> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write + Send> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> DumpSink for WriteSink<W> {
    fn write(&mut self, fragment: &str) -> Result<()> {
        self.inner.write_all(fragment.as_bytes())?;
        self.bytes_written += fragment.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// In-memory sink, mostly for tests
#[derive(Debug, Default)]
pub struct MemorySink {
    fragments: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Everything written so far, concatenated
    pub fn contents(&self) -> String {
        self.fragments.concat()
    }
}

impl DumpSink for MemorySink {
    fn write(&mut self, fragment: &str) -> Result<()> {
        self.fragments.push(fragment.to_string());
        Ok(())
    }
}
