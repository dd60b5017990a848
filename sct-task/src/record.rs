use crate::error::TaskError;
use sct_core::TrialRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Durable per-trial persistence. `append` must make the record
/// survive an abort of everything that follows it; `finish` writes the
/// end-of-session full dump.
pub trait RecordSink {
    fn append(&mut self, record: &TrialRecord) -> Result<(), TaskError>;
    fn finish(&mut self, records: &[TrialRecord]) -> Result<(), TaskError>;
}

/// One JSON object per line, flushed after every trial, with a pretty
/// JSON dump next to it at session end.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self, TaskError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dump_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }
}

impl RecordSink for JsonLinesSink {
    fn append(&mut self, record: &TrialRecord) -> Result<(), TaskError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self, records: &[TrialRecord]) -> Result<(), TaskError> {
        self.writer.flush()?;
        let dump = File::create(self.dump_path())?;
        serde_json::to_writer_pretty(dump, records)?;
        info!(
            records = records.len(),
            path = %self.dump_path().display(),
            "session dump written"
        );
        Ok(())
    }
}

/// In-memory sink for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<TrialRecord>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &TrialRecord) -> Result<(), TaskError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self, _records: &[TrialRecord]) -> Result<(), TaskError> {
        self.finished = true;
        Ok(())
    }
}
