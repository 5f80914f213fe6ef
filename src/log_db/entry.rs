// src/log_db/entry.rs
//! Decoding of RFC 6962 log entries
//!
//! Certificates are treated as opaque DER blobs throughout; decoding stops
//! at the framing layer and never interprets certificate fields.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeZone, Utc};

/// Entry kind from the MerkleTreeLeaf header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// x509_entry: a submitted end-entity certificate.
    X509,
    /// precert_entry: a precertificate submission.
    Precert,
}

/// One decoded entry from the source log database.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub kind: EntryKind,
    /// Submission time recorded by the log.
    pub timestamp: DateTime<Utc>,
    /// DER bytes of the submitted certificate (or precertificate).
    pub leaf: Vec<u8>,
    /// DER bytes of the chain that validated the submission, in chain order.
    pub intermediates: Vec<Vec<u8>>,
}

impl LogEntry {
    /// Decode one raw database record.
    ///
    /// `leaf_input` is the MerkleTreeLeaf structure; `extra_data` carries the
    /// validation chain (and, for precerts, the precertificate itself).
    /// Malformed data is a terminal error; the caller must stop the scan.
    pub fn decode(leaf_input: &[u8], extra_data: &[u8]) -> Result<Self> {
        if leaf_input.len() < 12 {
            bail!("leaf input too short: {} bytes", leaf_input.len());
        }

        // Timestamp at bytes 2-9, entry type at bytes 10-11 (big-endian)
        let timestamp_ms = u64::from_be_bytes(leaf_input[2..10].try_into()?);
        let entry_type = u16::from_be_bytes(leaf_input[10..12].try_into()?);

        let timestamp = Utc
            .timestamp_millis_opt(timestamp_ms as i64)
            .single()
            .with_context(|| format!("invalid log timestamp: {timestamp_ms}"))?;

        match entry_type {
            0 => {
                // x509_entry: certificate in leaf_input (CT extensions follow
                // and are ignored), chain in extra_data
                let (leaf, _extensions) =
                    read_cert(&leaf_input[12..]).context("malformed x509_entry leaf")?;
                let intermediates =
                    read_chain(extra_data).context("malformed x509_entry chain")?;

                Ok(Self {
                    kind: EntryKind::X509,
                    timestamp,
                    leaf,
                    intermediates,
                })
            }
            1 => {
                // precert_entry: full precertificate and chain in extra_data
                let (leaf, rest) =
                    read_cert(extra_data).context("malformed precert_entry")?;
                let intermediates = read_chain(rest).context("malformed precert_entry chain")?;

                Ok(Self {
                    kind: EntryKind::Precert,
                    timestamp,
                    leaf,
                    intermediates,
                })
            }
            other => bail!("unknown entry type: {}", other),
        }
    }
}

/// Read one 24-bit-length-prefixed certificate; returns it and the rest of
/// the buffer.
fn read_cert(buf: &[u8]) -> Result<(Vec<u8>, &[u8])> {
    if buf.len() < 3 {
        bail!("missing certificate length");
    }
    let len = read_u24(buf);
    let rest = &buf[3..];
    if rest.len() < len {
        bail!("certificate truncated: expected {} bytes, have {}", len, rest.len());
    }
    Ok((rest[..len].to_vec(), &rest[len..]))
}

/// Read a 24-bit-length-prefixed list of certificates in chain order.
fn read_chain(buf: &[u8]) -> Result<Vec<Vec<u8>>> {
    if buf.len() < 3 {
        bail!("missing chain length");
    }
    let total = read_u24(buf);
    let rest = &buf[3..];
    if rest.len() < total {
        bail!("chain truncated: expected {} bytes, have {}", total, rest.len());
    }

    let mut chain_buf = &rest[..total];
    let mut chain = Vec::new();
    while !chain_buf.is_empty() {
        let (cert, next) = read_cert(chain_buf)?;
        chain.push(cert);
        chain_buf = next;
    }
    Ok(chain)
}

fn read_u24(buf: &[u8]) -> usize {
    ((buf[0] as usize) << 16) | ((buf[1] as usize) << 8) | (buf[2] as usize)
}
