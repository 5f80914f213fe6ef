// src/writer.rs
//! Asynchronous record writers for the output streams
//!
//! Each writer task owns one output file and drains one bounded queue in
//! strict FIFO order, so write order equals submission order. A writer
//! suspends when its queue is empty and exits once the channel is closed
//! and drained. Any write failure is fatal; there is no retry.

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::records::WireRecord;

/// Spawn a writer task that appends every record received on `rx` to
/// `file`, returning the number of records written.
pub fn spawn_writer<R: WireRecord>(
    name: &'static str,
    file: File,
    mut rx: mpsc::Receiver<R>,
) -> JoinHandle<Result<u64>> {
    tokio::spawn(async move {
        let mut out = BufWriter::new(file);
        let mut written = 0u64;

        while let Some(record) = rx.recv().await {
            out.write_all(&record.encode())
                .await
                .with_context(|| format!("write to {} stream failed", name))?;
            written += 1;
        }

        out.flush()
            .await
            .with_context(|| format!("flush of {} stream failed", name))?;

        debug!("{} writer finished after {} records", name, written);
        Ok(written)
    })
}
