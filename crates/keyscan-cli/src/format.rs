//! Terminal and JSON rendering of key pages.

use colored::Colorize;
use keyscan_core::{KeyInfo, KeysPage, ShardScanResult, ShardState};

/// Strips ANSI escape sequences and other control characters from
/// store-supplied strings so key names can't drive the terminal.
fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.next() == Some('[') {
                // CSI: consume through the final letter
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else if ch == '\t' || !ch.is_control() {
            out.push(ch);
        }
    }
    out
}

/// One line per key: `N) "name" type ttl size`.
pub fn format_key(index: usize, key: &KeyInfo) -> String {
    let mut line = format!(
        "{}) {}",
        index,
        format!("\"{}\"", sanitize(&key.name_lossy())).green()
    );
    if let Some(data_type) = &key.data_type {
        line.push_str(&format!(" {}", data_type.as_str().cyan()));
    }
    if let Some(ttl) = key.ttl {
        let ttl = match ttl {
            -1 => "no expiry".to_string(),
            secs => format!("ttl {secs}s"),
        };
        line.push_str(&format!(" {}", ttl.yellow()));
    }
    if let Some(size) = key.size {
        line.push_str(&format!(" {}", human_size(size).dimmed()));
    }
    line
}

/// Per-shard progress: address, state, cursor and work spent.
pub fn format_shard(shard: &ShardScanResult) -> String {
    let state = match shard.state {
        ShardState::NotStarted => "not started".dimmed(),
        ShardState::Scanning => "scanning".yellow(),
        ShardState::Exhausted => "done".green(),
        ShardState::Excluded => "excluded".dimmed(),
    };
    format!(
        "{} {} cursor={} scanned={}/{} keys={}",
        shard.shard.to_string().bold(),
        state,
        shard.cursor,
        shard.scanned,
        shard.total,
        shard.keys.len()
    )
}

/// Human-readable page: keys, then one line per shard, then the cursor to
/// resume from when the scan isn't finished.
pub fn format_page(page: &KeysPage, first_index: usize) -> String {
    let mut lines: Vec<String> = page
        .keys()
        .enumerate()
        .map(|(i, key)| format_key(first_index + i, key))
        .collect();
    if lines.is_empty() {
        lines.push("(no keys)".dimmed().to_string());
    }
    lines.extend(page.shards.iter().map(format_shard));
    if !page.is_complete() {
        lines.push(format!("{} {}", "next cursor:".bold(), page.cursor));
    }
    lines.join("\n")
}

/// Serializes a page as one line of JSON.
pub fn page_json(page: &KeysPage) -> Result<String, serde_json::Error> {
    serde_json::to_string(page)
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}
