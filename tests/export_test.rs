// Integration tests for ct-pack
use ct_pack::log_db::{EntryKind, LogDbReader, LogEntry};
use ct_pack::pipeline::{
    ENTRIES_FILE_NAME, ExportPipeline, INTERMEDIATES_FILE_NAME, run_export,
};
use ct_pack::progress::ProgressReporter;

use chrono::{TimeZone, Utc};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

// ===== Raw database builders =====

fn u24(len: usize) -> [u8; 3] {
    [(len >> 16) as u8, (len >> 8) as u8, len as u8]
}

fn x509_leaf_input(timestamp_ms: u64, cert: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8, 0u8];
    buf.extend_from_slice(&timestamp_ms.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&u24(cert.len()));
    buf.extend_from_slice(cert);
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf
}

fn precert_leaf_input(timestamp_ms: u64) -> Vec<u8> {
    let mut buf = vec![0u8, 0u8];
    buf.extend_from_slice(&timestamp_ms.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf
}

fn chain_data(certs: &[&[u8]]) -> Vec<u8> {
    let total: usize = certs.iter().map(|c| 3 + c.len()).sum();
    let mut buf = Vec::new();
    buf.extend_from_slice(&u24(total));
    for cert in certs {
        buf.extend_from_slice(&u24(cert.len()));
        buf.extend_from_slice(cert);
    }
    buf
}

fn precert_extra_data(precert: &[u8], chain: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&u24(precert.len()));
    buf.extend_from_slice(precert);
    buf.extend_from_slice(&chain_data(chain));
    buf
}

fn raw_record(leaf_input: &[u8], extra_data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(leaf_input.len() as u32).to_be_bytes());
    buf.extend_from_slice(leaf_input);
    buf.extend_from_slice(&(extra_data.len() as u32).to_be_bytes());
    buf.extend_from_slice(extra_data);
    buf
}

fn write_db(records: &[Vec<u8>]) -> tempfile::NamedTempFile {
    let mut db = tempfile::NamedTempFile::new().unwrap();
    for record in records {
        db.write_all(record).unwrap();
    }
    db.flush().unwrap();
    db
}

// ===== Output file parsers =====

fn parse_entries_file(path: &Path) -> Vec<(Vec<u8>, Vec<u16>)> {
    let bytes = std::fs::read(path).unwrap();
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        let leaf = bytes[pos..pos + len].to_vec();
        pos += len;
        let count = u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap()) as usize;
        pos += 2;
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap()));
            pos += 2;
        }
        records.push((leaf, ids));
    }
    records
}

fn parse_intermediates_file(path: &Path) -> Vec<Vec<u8>> {
    let bytes = std::fs::read(path).unwrap();
    let mut blobs = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        blobs.push(bytes[pos..pos + len].to_vec());
        pos += len;
    }
    blobs
}

fn quiet_reporter() -> ProgressReporter {
    ProgressReporter::new(false, 50_000, 1_000)
}

// ===== Scenarios =====

#[tokio::test]
async fn test_export_round_trip() {
    let db = write_db(&[
        raw_record(
            &x509_leaf_input(1_500_000_000_000, b"leaf-a"),
            &chain_data(&[b"cert-x", b"cert-y"]),
        ),
        raw_record(
            &precert_leaf_input(1_500_000_001_000),
            &precert_extra_data(b"precert", &[b"cert-y"]),
        ),
        raw_record(
            &x509_leaf_input(1_500_000_002_000, b"leaf-b"),
            &chain_data(&[b"cert-y", b"cert-x"]),
        ),
        raw_record(
            &x509_leaf_input(1_500_000_003_000, b"leaf-c"),
            &chain_data(&[b"cert-y", b"cert-z"]),
        ),
    ]);

    let out = tempfile::tempdir().unwrap();
    let reader = LogDbReader::open(db.path()).await.unwrap();
    let pipeline = ExportPipeline::start(out.path(), 100, quiet_reporter())
        .await
        .unwrap();

    let summary = run_export(reader, pipeline).await.unwrap();
    assert_eq!(summary.entries_written, 3);
    assert_eq!(summary.distinct_intermediates, 3);

    // Intermediates in discovery order; file position equals id
    let intermediates = parse_intermediates_file(&out.path().join(INTERMEDIATES_FILE_NAME));
    assert_eq!(
        intermediates,
        vec![b"cert-x".to_vec(), b"cert-y".to_vec(), b"cert-z".to_vec()]
    );

    // Id sequences follow original chain order, repeats and all
    let entries = parse_entries_file(&out.path().join(ENTRIES_FILE_NAME));
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], (b"leaf-a".to_vec(), vec![0, 1]));
    assert_eq!(entries[1], (b"leaf-b".to_vec(), vec![1, 0]));
    assert_eq!(entries[2], (b"leaf-c".to_vec(), vec![1, 2]));

    // Dereferencing ids reconstructs every original chain
    let originals: [&[&[u8]]; 3] = [
        &[b"cert-x", b"cert-y"],
        &[b"cert-y", b"cert-x"],
        &[b"cert-y", b"cert-z"],
    ];
    for ((_, ids), original) in entries.iter().zip(originals) {
        let chain: Vec<&[u8]> = ids
            .iter()
            .map(|&id| intermediates[id as usize].as_slice())
            .collect();
        assert_eq!(chain, original);
    }
}

#[tokio::test]
async fn test_non_leaf_entries_produce_no_records() {
    let db = write_db(&[
        raw_record(
            &precert_leaf_input(1_500_000_000_000),
            &precert_extra_data(b"precert", &[b"issuer"]),
        ),
        raw_record(
            &x509_leaf_input(1_500_000_001_000, b"leaf"),
            &chain_data(&[b"issuer"]),
        ),
    ]);

    let out = tempfile::tempdir().unwrap();
    let reader = LogDbReader::open(db.path()).await.unwrap();
    let pipeline = ExportPipeline::start(out.path(), 100, quiet_reporter())
        .await
        .unwrap();

    let summary = run_export(reader, pipeline).await.unwrap();
    assert_eq!(summary.entries_written, 1);
    assert_eq!(summary.distinct_intermediates, 1);

    let entries = parse_entries_file(&out.path().join(ENTRIES_FILE_NAME));
    assert_eq!(entries, vec![(b"leaf".to_vec(), vec![0])]);
    let intermediates = parse_intermediates_file(&out.path().join(INTERMEDIATES_FILE_NAME));
    assert_eq!(intermediates, vec![b"issuer".to_vec()]);
}

#[tokio::test]
async fn test_decode_error_stops_export_but_keeps_prior_output() {
    let mut bad_leaf_input = x509_leaf_input(1_500_000_001_000, b"leaf-bad");
    bad_leaf_input[10..12].copy_from_slice(&9u16.to_be_bytes()); // unknown entry type

    let db = write_db(&[
        raw_record(
            &x509_leaf_input(1_500_000_000_000, b"leaf-ok"),
            &chain_data(&[b"cert-x"]),
        ),
        raw_record(&bad_leaf_input, &chain_data(&[])),
        raw_record(
            &x509_leaf_input(1_500_000_002_000, b"leaf-unreached"),
            &chain_data(&[]),
        ),
    ]);

    let out = tempfile::tempdir().unwrap();
    let reader = LogDbReader::open(db.path()).await.unwrap();
    let pipeline = ExportPipeline::start(out.path(), 100, quiet_reporter())
        .await
        .unwrap();

    let err = run_export(reader, pipeline).await.unwrap_err();
    assert!(err.to_string().contains("unknown entry type"));

    // The entry before the corruption is on disk; nothing after it is.
    let entries = parse_entries_file(&out.path().join(ENTRIES_FILE_NAME));
    assert_eq!(entries, vec![(b"leaf-ok".to_vec(), vec![0])]);
    let intermediates = parse_intermediates_file(&out.path().join(INTERMEDIATES_FILE_NAME));
    assert_eq!(intermediates, vec![b"cert-x".to_vec()]);
}

#[tokio::test]
async fn test_concurrent_entries_agree_on_ids() {
    const TASKS: usize = 8;
    const ENTRIES_PER_TASK: usize = 25;
    const POOL: usize = 16;

    // Pool of distinct intermediates; chains are picked deterministically
    // so every entry's leaf can declare which pool members it used.
    fn pool_blob(index: usize) -> Vec<u8> {
        vec![b'I', index as u8]
    }

    fn chain_indices(task: usize, i: usize) -> [usize; 3] {
        [(task + i) % POOL, (task * 7 + i * 3) % POOL, (task + i * 11) % POOL]
    }

    let out = tempfile::tempdir().unwrap();
    let pipeline = Arc::new(
        ExportPipeline::start(out.path(), 100, quiet_reporter())
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            for i in 0..ENTRIES_PER_TASK {
                let indices = chain_indices(task, i);
                let entry = LogEntry {
                    kind: EntryKind::X509,
                    timestamp: Utc.timestamp_millis_opt(1_500_000_000_000).unwrap(),
                    leaf: vec![task as u8, i as u8, indices[0] as u8, indices[1] as u8, indices[2] as u8],
                    intermediates: indices.iter().map(|&n| pool_blob(n)).collect(),
                };
                pipeline.process(&entry).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let pipeline = Arc::try_unwrap(pipeline).ok().expect("pipeline still shared");
    let summary = pipeline.finish().await.unwrap();
    assert_eq!(summary.entries_written, (TASKS * ENTRIES_PER_TASK) as u64);

    // No identity was ever assigned two ids: every pool blob appears in the
    // intermediates file exactly once.
    let intermediates = parse_intermediates_file(&out.path().join(INTERMEDIATES_FILE_NAME));
    assert_eq!(intermediates.len(), summary.distinct_intermediates as usize);
    let mut sorted = intermediates.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), intermediates.len());

    // No id refers to two identities: every record's ids dereference to
    // exactly the pool blobs its leaf declared, in order.
    let entries = parse_entries_file(&out.path().join(ENTRIES_FILE_NAME));
    assert_eq!(entries.len(), TASKS * ENTRIES_PER_TASK);
    for (leaf, ids) in entries {
        assert_eq!(ids.len(), 3);
        for (position, id) in ids.iter().enumerate() {
            let declared = pool_blob(leaf[2 + position] as usize);
            assert_eq!(intermediates[*id as usize], declared);
        }
    }
}

#[tokio::test]
async fn test_empty_database_produces_empty_files() {
    let db = write_db(&[]);

    let out = tempfile::tempdir().unwrap();
    let reader = LogDbReader::open(db.path()).await.unwrap();
    let pipeline = ExportPipeline::start(out.path(), 100, quiet_reporter())
        .await
        .unwrap();

    let summary = run_export(reader, pipeline).await.unwrap();
    assert_eq!(summary.entries_written, 0);
    assert_eq!(summary.distinct_intermediates, 0);

    assert!(std::fs::read(out.path().join(ENTRIES_FILE_NAME)).unwrap().is_empty());
    assert!(std::fs::read(out.path().join(INTERMEDIATES_FILE_NAME)).unwrap().is_empty());
}
