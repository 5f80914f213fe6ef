// src/pipeline.rs
//! The dedup-and-serialize pipeline
//!
//! One producer resolves each entry's intermediates to compact ids and
//! streams two correlated records through independent writer tasks. A
//! single mutex guards the registry, the entry counter, and both queue
//! submissions, so no two entries can disagree about which intermediates
//! are new and the intermediates stream never lags behind an entries
//! record that references it. Hashing happens outside the lock.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::fingerprint::Fingerprint;
use crate::log_db::{EntryKind, LogDbReader, LogEntry};
use crate::progress::ProgressReporter;
use crate::records::{EntryRecord, NewIntermediates};
use crate::registry::IntermediateRegistry;
use crate::writer::spawn_writer;

pub const ENTRIES_FILE_NAME: &str = "entries";
pub const INTERMEDIATES_FILE_NAME: &str = "intermediates";

/// State guarded by the pipeline mutex. Never touched outside it.
struct Shared {
    registry: IntermediateRegistry,
    entries_processed: u64,
}

/// Totals reported after a completed export.
#[derive(Debug, Clone, Copy)]
pub struct ExportSummary {
    pub entries_written: u64,
    pub distinct_intermediates: u64,
}

pub struct ExportPipeline {
    shared: Arc<Mutex<Shared>>,
    entries_tx: mpsc::Sender<EntryRecord>,
    intermediates_tx: mpsc::Sender<NewIntermediates>,
    entries_writer: JoinHandle<Result<u64>>,
    intermediates_writer: JoinHandle<Result<u64>>,
    reporter: ProgressReporter,
}

impl ExportPipeline {
    /// Create the two output files inside `output_dir` and start a writer
    /// task for each. File creation failure is fatal.
    pub async fn start(
        output_dir: &Path,
        queue_capacity: usize,
        reporter: ProgressReporter,
    ) -> Result<Self> {
        let entries_path = output_dir.join(ENTRIES_FILE_NAME);
        let entries_file = File::create(&entries_path)
            .await
            .with_context(|| format!("failed to create {}", entries_path.display()))?;

        let intermediates_path = output_dir.join(INTERMEDIATES_FILE_NAME);
        let intermediates_file = File::create(&intermediates_path)
            .await
            .with_context(|| format!("failed to create {}", intermediates_path.display()))?;

        let (entries_tx, entries_rx) = mpsc::channel(queue_capacity);
        let (intermediates_tx, intermediates_rx) = mpsc::channel(queue_capacity);

        Ok(Self {
            shared: Arc::new(Mutex::new(Shared {
                registry: IntermediateRegistry::new(),
                entries_processed: 0,
            })),
            entries_tx,
            intermediates_tx,
            entries_writer: spawn_writer("entries", entries_file, entries_rx),
            intermediates_writer: spawn_writer("intermediates", intermediates_file, intermediates_rx),
            reporter,
        })
    }

    /// Process one decoded log entry.
    ///
    /// Only x509 entries produce output; every other kind returns without
    /// touching the registry or the counter. Suspends when either queue is
    /// full, which is the backpressure that throttles the reader.
    pub async fn process(&self, entry: &LogEntry) -> Result<()> {
        if entry.kind != EntryKind::X509 {
            return Ok(());
        }

        // Hashing is pure, so it stays outside the lock
        let fingerprints: Vec<Fingerprint> =
            entry.intermediates.iter().map(|der| Fingerprint::of(der)).collect();

        let processed = {
            let mut shared = self.shared.lock().await;

            let mut chain_ids = Vec::with_capacity(fingerprints.len());
            let mut new_certs = Vec::new();
            for (fingerprint, der) in fingerprints.iter().zip(&entry.intermediates) {
                let (id, is_new) = shared.registry.resolve(*fingerprint)?;
                chain_ids.push(id);
                if is_new {
                    new_certs.push(der.clone());
                }
            }

            shared.entries_processed += 1;
            let processed = shared.entries_processed;

            // Both submissions happen under the lock so writer ordering
            // across the two streams stays consistent with registry state.
            self.intermediates_tx
                .send(NewIntermediates { certificates: new_certs })
                .await
                .map_err(|_| anyhow!("intermediates writer stopped"))?;
            self.entries_tx
                .send(EntryRecord {
                    leaf: entry.leaf.clone(),
                    chain_ids,
                })
                .await
                .map_err(|_| anyhow!("entries writer stopped"))?;

            processed
        };

        self.reporter.tick(processed);
        Ok(())
    }

    /// Close both queues, wait for the writers to drain and flush, and
    /// report the run totals. Surfaces the first writer error, if any.
    pub async fn finish(self) -> Result<ExportSummary> {
        let Self {
            shared,
            entries_tx,
            intermediates_tx,
            entries_writer,
            intermediates_writer,
            reporter,
        } = self;

        // Dropping the senders closes the channels; the writers drain
        // whatever is queued and exit.
        drop(entries_tx);
        drop(intermediates_tx);

        let entries_written = entries_writer.await.context("entries writer panicked")??;
        intermediates_writer
            .await
            .context("intermediates writer panicked")??;

        reporter.finish();

        let shared = shared.lock().await;
        Ok(ExportSummary {
            entries_written,
            distinct_intermediates: shared.registry.len() as u64,
        })
    }
}

/// Drive a full export: process every entry the reader yields, then drain
/// the writers.
///
/// Reader decode errors are fatal and stop the scan, but records already
/// queued for prior entries are drained and flushed first, so output
/// written so far stays valid on disk.
pub async fn run_export(mut reader: LogDbReader, pipeline: ExportPipeline) -> Result<ExportSummary> {
    let mut span: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

    loop {
        let entry = match reader.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(read_err) => {
                let _ = pipeline.finish().await;
                return Err(read_err);
            }
        };

        span = Some(match span {
            None => (entry.timestamp, entry.timestamp),
            Some((first, _)) => (first, entry.timestamp),
        });

        if let Err(process_err) = pipeline.process(&entry).await {
            // A dead writer carries the root cause; prefer its error.
            return match pipeline.finish().await {
                Err(writer_err) => Err(writer_err),
                Ok(_) => Err(process_err),
            };
        }
    }

    let summary = pipeline.finish().await?;
    if let Some((first, last)) = span {
        info!(
            "Database spans {} to {}",
            first.format("%Y-%m-%d %H:%M:%S"),
            last.format("%Y-%m-%d %H:%M:%S")
        );
    }
    info!(
        "Export complete: {} entries, {} distinct intermediates",
        summary.entries_written, summary.distinct_intermediates
    );
    Ok(summary)
}
