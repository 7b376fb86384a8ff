//! Append-only memory log
//!
//! The log is the only durable source of truth for memory content: one JSON
//! entry per line, in ordinal order. It is read in full once when a store
//! opens and afterwards only grows by [`MemoryLog::append`].

use ghostmesh_core::{Error, LogEntry, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// JSONL-backed memory log
#[derive(Debug, Clone)]
pub struct MemoryLog {
    path: PathBuf,
    sync_writes: bool,
}

impl MemoryLog {
    pub fn new<P: Into<PathBuf>>(path: P, sync_writes: bool) -> Self {
        Self {
            path: path.into(),
            sync_writes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record text in file order
    ///
    /// A missing file is an empty log. Blank lines are skipped; lines that do
    /// not parse as entries are kept as raw text.
    pub fn load(&self) -> Result<Vec<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Memory log {} not found, starting with 0 memories",
                    self.path.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.unavailable("open", e)),
        };

        let mut reader = BufReader::new(file);
        let mut texts = Vec::new();
        let mut raw_lines = 0usize;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| self.unavailable("read", e))?;
            if read == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            if let Some(parsed) = LogEntry::parse_line(&line) {
                if parsed.is_raw() {
                    raw_lines += 1;
                    debug!("Keeping unparsed log line {} as raw text", texts.len());
                }
                texts.push(parsed.into_text());
            }
        }

        if raw_lines > 0 {
            warn!(
                "{} of {} lines in {} were not valid entries and were kept as raw text",
                raw_lines,
                texts.len(),
                self.path.display()
            );
        }

        info!("Loaded {} memories from {}", texts.len(), self.path.display());
        Ok(texts)
    }

    /// Append one entry as a whole line
    ///
    /// When `sync_writes` is set the data is synced to disk before returning.
    /// A torn trailing line left by an earlier crash is terminated first so
    /// that the new entry starts on its own line.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let mut line = entry.to_line()?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| self.unavailable("create directory for", e))?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.unavailable("open", e))?;

        if !ends_with_newline(&mut file).map_err(|e| self.unavailable("inspect", e))? {
            warn!(
                "Memory log {} ends with a partial line, terminating it",
                self.path.display()
            );
            line.insert(0, '\n');
        }

        file.write_all(line.as_bytes())
            .map_err(|e| self.unavailable("append to", e))?;

        if self.sync_writes {
            file.sync_data().map_err(|e| self.unavailable("sync", e))?;
        }

        debug!("Appended {} bytes to {}", line.len(), self.path.display());
        Ok(())
    }

    fn unavailable(&self, action: &str, err: std::io::Error) -> Error {
        Error::StorageUnavailable(format!(
            "failed to {} {}: {}",
            action,
            self.path.display(),
            err
        ))
    }
}

/// True for an empty file or one whose last byte is `\n`
fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
