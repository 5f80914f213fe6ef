// src/log_db/reader.rs
//! Sequential reader over the source log database
//!
//! The database is an append-only sequence of raw entry records:
//!
//! ```text
//! [u32 BE length][leaf_input bytes][u32 BE length][extra_data bytes]
//! ```
//!
//! Entries come back one at a time in log order. The stream is finite and
//! not restartable; a decode error is terminal.

use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use super::entry::LogEntry;

// Raw fields are bounded by their inner 24-bit lengths; anything near this
// cap means a corrupt length prefix, not a real record.
const MAX_FIELD_LEN: usize = 1 << 26;

/// Lazy, single-pass reader over a log database file.
pub struct LogDbReader {
    reader: BufReader<File>,
}

impl LogDbReader {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("failed to open log database {}", path.display()))?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    /// Next decoded entry, or `None` at a clean end of input.
    pub async fn next_entry(&mut self) -> Result<Option<LogEntry>> {
        let Some(leaf_input) = self.read_field(true).await? else {
            return Ok(None);
        };
        let Some(extra_data) = self.read_field(false).await? else {
            bail!("truncated record: missing extra_data");
        };

        LogEntry::decode(&leaf_input, &extra_data).map(Some)
    }

    /// Read one length-prefixed field. End of file is only clean when it
    /// falls on a record boundary (`at_boundary`), before any length byte.
    async fn read_field(&mut self, at_boundary: bool) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self
                .reader
                .read(&mut len_buf[filled..])
                .await
                .context("failed to read from log database")?;
            if n == 0 {
                if at_boundary && filled == 0 {
                    return Ok(None);
                }
                bail!("truncated record: unexpected end of database");
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FIELD_LEN {
            bail!("implausible record field length: {} bytes", len);
        }

        let mut field = vec![0u8; len];
        self.reader
            .read_exact(&mut field)
            .await
            .context("truncated record: unexpected end of database")?;
        Ok(Some(field))
    }
}
