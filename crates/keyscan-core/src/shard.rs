//! Budgeted SCAN over a single shard.

use bytes::Bytes;
use keyscan_protocol::Frame;
use tracing::debug;

use crate::budget::ScanBudget;
use crate::client::{command, StoreClient};
use crate::cursor::ShardCursor;
use crate::error::ScanError;
use crate::types::{DataType, ShardAddress, ShardState};

/// Per-request SCAN options, shared by every shard of a page.
#[derive(Debug, Clone, Copy)]
pub struct ScanParams<'a> {
    /// Glob sent verbatim as MATCH.
    pub pattern: &'a str,
    /// COUNT hint per call, also the budget cost of each call.
    pub count: u64,
    pub data_type: Option<&'a DataType>,
}

/// What one shard produced this page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardScan {
    pub shard: ShardAddress,
    pub cursor: i64,
    pub total: u64,
    pub scanned: u64,
    pub names: Vec<Bytes>,
    pub state: ShardState,
}

/// Scans one shard until its cursor wraps to `0` or the budget refuses the
/// next call.
///
/// Excluded shards (negative cursor) and empty shards cost nothing. Every
/// call charges `count` to the budget whether or not it found keys.
pub async fn scan_shard<C: StoreClient>(
    client: &C,
    entry: &ShardCursor,
    params: &ScanParams<'_>,
    budget: &mut ScanBudget,
) -> Result<ShardScan, ScanError> {
    let mut result = ShardScan {
        shard: entry.shard.clone(),
        cursor: entry.cursor,
        total: 0,
        scanned: 0,
        names: Vec::new(),
        state: ShardState::Excluded,
    };
    if entry.is_excluded() {
        return Ok(result);
    }

    result.total = client.total_keys(Some(&entry.shard)).await?;
    if result.total == 0 {
        result.state = ShardState::Exhausted;
        return Ok(result);
    }

    let mut started = false;
    while !(started && result.cursor == 0) {
        if !budget.has_room(params.count) {
            break;
        }
        let reply = client
            .send_command(Some(&entry.shard), scan_args(result.cursor, params))
            .await?;
        budget.spend(params.count);
        result.scanned += params.count;
        started = true;

        let (next, names) = parse_scan_reply(reply, params)?;
        result.cursor = next;
        result.names.extend(names);
    }

    result.state = if started && result.cursor == 0 {
        ShardState::Exhausted
    } else if result.cursor != 0 {
        ShardState::Scanning
    } else {
        ShardState::NotStarted
    };
    debug!(
        shard = %result.shard,
        cursor = result.cursor,
        scanned = result.scanned,
        found = result.names.len(),
        state = ?result.state,
        "shard scanned"
    );
    Ok(result)
}

fn scan_args(cursor: i64, params: &ScanParams<'_>) -> Vec<Bytes> {
    let mut args = command(&["SCAN"]);
    args.push(Bytes::from(cursor.to_string()));
    args.push(Bytes::from_static(b"MATCH"));
    args.push(Bytes::copy_from_slice(params.pattern.as_bytes()));
    args.push(Bytes::from_static(b"COUNT"));
    args.push(Bytes::from(params.count.to_string()));
    if let Some(data_type) = params.data_type {
        args.push(Bytes::from_static(b"TYPE"));
        args.push(Bytes::copy_from_slice(data_type.as_str().as_bytes()));
    }
    args
}

/// Splits `[cursor, [name, ...]]`.
fn parse_scan_reply(reply: Frame, params: &ScanParams<'_>) -> Result<(i64, Vec<Bytes>), ScanError> {
    if let Some(message) = reply.error_message() {
        if params.data_type.is_some() && message.starts_with("ERR syntax error") {
            return Err(ScanError::TypeFilterUnsupported);
        }
        return Err(ScanError::from_reply(message));
    }

    let detail = || format!("{reply:?}");
    let mut parts = reply
        .clone()
        .into_array()
        .filter(|p| p.len() == 2)
        .ok_or_else(|| ScanError::unexpected("SCAN", detail()))?
        .into_iter();
    let cursor = parts
        .next()
        .and_then(|c| c.as_integer())
        .ok_or_else(|| ScanError::unexpected("SCAN", detail()))?;
    let names = parts
        .next()
        .and_then(Frame::into_array)
        .ok_or_else(|| ScanError::unexpected("SCAN", detail()))?
        .into_iter()
        .filter_map(Frame::into_bytes)
        .collect();
    Ok((cursor, names))
}
