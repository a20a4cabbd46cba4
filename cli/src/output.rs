//! Staged dump output
//!
//! The dump is written to a temporary file next to the target and only moved
//! into place once the run succeeds, so a failed run never leaves a
//! truncated dump at the requested path.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use masked_dump_core::sink::WriteSink;
use tempfile::TempPath;
use tracing::debug;

/// Plain or gzip-compressed writer over the staging file
pub enum OutputWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputWriter {
    /// Flush buffers, write the gzip trailer and sync to disk
    fn finish(self) -> io::Result<()> {
        let buffered = match self {
            OutputWriter::Plain(writer) => writer,
            OutputWriter::Gzip(encoder) => encoder.finish()?,
        };
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputWriter::Plain(writer) => writer.write(buf),
            OutputWriter::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Plain(writer) => writer.flush(),
            OutputWriter::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// A dump being written to a staging file. Dropping it without
/// [`StagedOutput::commit`] removes the staging file.
pub struct StagedOutput {
    sink: WriteSink<OutputWriter>,
    staging: TempPath,
    target: PathBuf,
}

impl StagedOutput {
    /// Stage a dump for `output`. With `gzip` the target gets a `.gz` suffix
    /// unless it already has one.
    pub fn create(output: &Path, gzip: bool) -> Result<Self> {
        let target = target_path(output, gzip);
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let staged = tempfile::Builder::new()
            .prefix(".masked-dump-")
            .tempfile_in(dir)
            .with_context(|| format!("Failed to create staging file in {}", dir.display()))?;
        let (file, staging) = staged.into_parts();
        debug!("Staging dump at {}", staging.display());

        let writer = BufWriter::new(file);
        let writer = if gzip {
            OutputWriter::Gzip(GzEncoder::new(writer, Compression::default()))
        } else {
            OutputWriter::Plain(writer)
        };

        Ok(Self {
            sink: WriteSink::new(writer),
            staging,
            target,
        })
    }

    pub fn sink(&mut self) -> &mut WriteSink<OutputWriter> {
        &mut self.sink
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Finish the staging file and move it to the target path
    pub fn commit(self) -> Result<PathBuf> {
        let bytes = self.sink.bytes_written();
        self.sink
            .into_inner()
            .finish()
            .context("Failed to finish dump file")?;

        self.staging
            .persist(&self.target)
            .with_context(|| format!("Failed to move dump to {}", self.target.display()))?;

        debug!("Committed {} bytes of SQL to {}", bytes, self.target.display());
        Ok(self.target)
    }
}

fn target_path(output: &Path, gzip: bool) -> PathBuf {
    if gzip && output.extension().map_or(true, |ext| ext != "gz") {
        let mut name = output.as_os_str().to_owned();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        output.to_path_buf()
    }
}
