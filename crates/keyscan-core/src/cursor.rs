//! Encoding of the opaque cursor handed to callers between pages.
//!
//! A standalone deployment has one shard, so its cursor is just the store's
//! own SCAN cursor (`"17"`). A cluster cursor lists every shard in order as
//! `host:port@cursor`, joined by `||`:
//!
//! ```text
//! 172.1.0.1:7000@0||172.1.0.1:7001@1792||172.1.0.1:7002@-1
//! ```
//!
//! `"0"` starts every shard from the beginning. A negative value tells the
//! scanner to skip that shard for the page.

use crate::error::ScanError;
use crate::types::{ShardAddress, Topology};

/// Separates per-shard segments in a cluster cursor.
pub const SHARD_DELIMITER: &str = "||";

/// Separates the address from the cursor inside one segment.
const CURSOR_SEPARATOR: char = '@';

/// The cursor for a fresh scan.
pub const INITIAL_CURSOR: &str = "0";

/// One shard's position in the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardCursor {
    pub shard: ShardAddress,
    /// `0` is "not started" or "exhausted" depending on context; negative
    /// means "excluded from this page".
    pub cursor: i64,
}

impl ShardCursor {
    pub fn new(shard: ShardAddress, cursor: i64) -> Self {
        Self { shard, cursor }
    }

    pub fn is_excluded(&self) -> bool {
        self.cursor < 0
    }
}

/// Decodes a caller-supplied cursor against the current topology.
///
/// Fails with [`ScanError::MalformedCursor`] if any segment doesn't parse,
/// or if the shards it names don't match the topology one for one. The
/// result keeps the cursor's shard order.
pub fn decode(cursor: &str, topology: &Topology) -> Result<Vec<ShardCursor>, ScanError> {
    let cursor = cursor.trim();
    if cursor.is_empty() || cursor == INITIAL_CURSOR {
        return Ok(topology
            .shards()
            .iter()
            .map(|shard| ShardCursor::new(shard.clone(), 0))
            .collect());
    }

    match topology {
        Topology::Standalone(shard) => {
            let value = cursor
                .parse::<i64>()
                .map_err(|_| ScanError::MalformedCursor(cursor.to_string()))?;
            Ok(vec![ShardCursor::new(shard.clone(), value)])
        }
        Topology::Cluster(shards) => {
            let entries = cursor
                .split(SHARD_DELIMITER)
                .map(decode_segment)
                .collect::<Result<Vec<_>, _>>()?;
            check_topology(&entries, shards)?;
            Ok(entries)
        }
    }
}

/// Encodes shard positions for the caller, preserving their order.
pub fn encode(entries: &[ShardCursor], topology: &Topology) -> String {
    match topology {
        Topology::Standalone(_) => entries
            .first()
            .map_or_else(|| INITIAL_CURSOR.to_string(), |e| e.cursor.to_string()),
        Topology::Cluster(_) => entries
            .iter()
            .map(|e| format!("{}{CURSOR_SEPARATOR}{}", e.shard, e.cursor))
            .collect::<Vec<_>>()
            .join(SHARD_DELIMITER),
    }
}

fn decode_segment(segment: &str) -> Result<ShardCursor, ScanError> {
    let malformed = || ScanError::MalformedCursor(segment.to_string());

    let (addr, value) = segment.rsplit_once(CURSOR_SEPARATOR).ok_or_else(malformed)?;
    let shard = ShardAddress::parse(addr).map_err(|_| malformed())?;
    let cursor = value.parse::<i64>().map_err(|_| malformed())?;
    Ok(ShardCursor::new(shard, cursor))
}

/// Every topology shard must appear exactly once.
fn check_topology(entries: &[ShardCursor], shards: &[ShardAddress]) -> Result<(), ScanError> {
    if entries.len() != shards.len() {
        return Err(ScanError::MalformedCursor(format!(
            "cursor names {} shards, cluster has {}",
            entries.len(),
            shards.len()
        )));
    }
    for (i, entry) in entries.iter().enumerate() {
        if !shards.contains(&entry.shard) {
            return Err(ScanError::MalformedCursor(format!(
                "{} is not part of the cluster",
                entry.shard
            )));
        }
        if entries[..i].iter().any(|prev| prev.shard == entry.shard) {
            return Err(ScanError::MalformedCursor(format!(
                "{} appears more than once",
                entry.shard
            )));
        }
    }
    Ok(())
}
