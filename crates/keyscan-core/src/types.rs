//! Request and result types shared by every scanner component.
//!
//! Everything here is built fresh per request. The only value that
//! outlives a page is the encoded cursor the caller sends back.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Serialize, Serializer};

/// Match-all pattern used when a request doesn't specify one.
pub const DEFAULT_MATCH: &str = "*";

/// Identifies one node of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShardAddress {
    pub host: String,
    pub port: u16,
}

impl ShardAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host:port`, including bracketed IPv6 hosts like `[::1]:6379`.
    pub fn parse(addr: &str) -> Result<Self, String> {
        if let Some(bracket_end) = addr.find("]:") {
            let host = &addr[..bracket_end + 1];
            let port_str = &addr[bracket_end + 2..];
            let port = port_str
                .parse()
                .map_err(|_| format!("invalid port '{port_str}'"))?;
            return Ok(Self::new(host, port));
        }

        let (host, port_str) = addr
            .rsplit_once(':')
            .ok_or_else(|| "expected host:port format".to_string())?;
        if host.is_empty() {
            return Err("missing host".into());
        }
        let port = port_str
            .parse()
            .map_err(|_| format!("invalid port '{port_str}'"))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for ShardAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The shards a client can address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// One node; its cursor is encoded as a bare integer.
    Standalone(ShardAddress),
    /// Independent nodes, each with its own cursor, in a fixed order.
    Cluster(Vec<ShardAddress>),
}

impl Topology {
    /// Returns the shards in iteration order.
    pub fn shards(&self) -> &[ShardAddress] {
        match self {
            Topology::Standalone(addr) => std::slice::from_ref(addr),
            Topology::Cluster(nodes) => nodes,
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, Topology::Cluster(_))
    }
}

/// A store data type, as reported by `TYPE` and accepted by `SCAN ... TYPE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Hash,
    List,
    Set,
    ZSet,
    Stream,
    Json,
    TimeSeries,
    Graph,
    /// A module type we don't know by name.
    Other(String),
}

impl DataType {
    /// The name the store uses for this type.
    pub fn as_str(&self) -> &str {
        match self {
            DataType::String => "string",
            DataType::Hash => "hash",
            DataType::List => "list",
            DataType::Set => "set",
            DataType::ZSet => "zset",
            DataType::Stream => "stream",
            DataType::Json => "ReJSON-RL",
            DataType::TimeSeries => "TSDB-TYPE",
            DataType::Graph => "graphdata",
            DataType::Other(name) => name,
        }
    }

    /// Interprets a `TYPE` reply. `none` (no such key) yields `None`.
    pub fn from_reply(reply: &str) -> Option<Self> {
        match reply {
            "none" => None,
            "string" => Some(DataType::String),
            "hash" => Some(DataType::Hash),
            "list" => Some(DataType::List),
            "set" => Some(DataType::Set),
            "zset" => Some(DataType::ZSet),
            "stream" => Some(DataType::Stream),
            "ReJSON-RL" => Some(DataType::Json),
            "TSDB-TYPE" => Some(DataType::TimeSeries),
            "graphdata" => Some(DataType::Graph),
            other => Some(DataType::Other(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    /// Accepts store names (`zset`, `ReJSON-RL`) and friendlier aliases
    /// (`json`, `timeseries`, `graph`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "string" => DataType::String,
            "hash" => DataType::Hash,
            "list" => DataType::List,
            "set" => DataType::Set,
            "zset" | "sortedset" => DataType::ZSet,
            "stream" => DataType::Stream,
            "rejson-rl" | "json" => DataType::Json,
            "tsdb-type" | "timeseries" => DataType::TimeSeries,
            "graphdata" | "graph" => DataType::Graph,
            "none" | "" => return Err(format!("invalid data type '{s}'")),
            _ => DataType::Other(s.to_string()),
        };
        Ok(ty)
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Metadata for one key, computed fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyInfo {
    #[serde(serialize_with = "serialize_name")]
    pub name: Bytes,
    /// `None` only in names-only mode without a type filter.
    #[serde(rename = "type")]
    pub data_type: Option<DataType>,
    /// Seconds to live; `-1` means no expiry. `None` when not fetched.
    pub ttl: Option<i64>,
    /// Approximate memory usage in bytes, when known.
    pub size: Option<u64>,
}

impl KeyInfo {
    /// A key with no metadata beyond an optional known type.
    pub fn name_only(name: Bytes, data_type: Option<DataType>) -> Self {
        Self {
            name,
            data_type,
            ttl: None,
            size: None,
        }
    }

    /// The key name, lossily decoded for display.
    pub fn name_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

fn serialize_name<S: Serializer>(name: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(name))
}

/// Where one shard stands at the end of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardState {
    /// Cursor still `0` because the budget ran out before this shard's
    /// first SCAN.
    NotStarted,
    /// Cursor is non-zero; resubmit it to continue.
    Scanning,
    /// Every key on this shard has been visited (or it holds none).
    Exhausted,
    /// The caller's cursor marked this shard as skipped (negative cursor).
    Excluded,
}

impl ShardState {
    /// Returns true when resubmitting this shard's cursor can't yield
    /// more keys.
    pub fn is_finished(self) -> bool {
        matches!(self, ShardState::Exhausted | ShardState::Excluded)
    }
}

/// One shard's share of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardScanResult {
    pub shard: ShardAddress,
    /// Cursor to resume from on this shard.
    pub cursor: i64,
    /// Constant-time key count estimate for the shard (`0` when excluded).
    pub total: u64,
    /// Work units spent: the sum of COUNT hints sent, not keys returned.
    pub scanned: u64,
    pub keys: Vec<KeyInfo>,
    pub state: ShardState,
}

/// The answer to one "get keys" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeysPage {
    /// Opaque cursor to send back for the next page.
    pub cursor: String,
    /// One entry per shard, in cursor order.
    pub shards: Vec<ShardScanResult>,
}

impl KeysPage {
    /// Returns true once every shard is exhausted or excluded.
    pub fn is_complete(&self) -> bool {
        self.shards.iter().all(|s| s.state.is_finished())
    }

    /// Sum of total key estimates across shards.
    pub fn total(&self) -> u64 {
        self.shards.iter().map(|s| s.total).sum()
    }

    /// Sum of work units spent across shards.
    pub fn scanned(&self) -> u64 {
        self.shards.iter().map(|s| s.scanned).sum()
    }

    /// Iterates every returned key, shard by shard.
    pub fn keys(&self) -> impl Iterator<Item = &KeyInfo> {
        self.shards.iter().flat_map(|s| s.keys.iter())
    }
}

/// One "list keys" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// `"0"` for a fresh scan, or the cursor from the previous page.
    pub cursor: String,
    /// COUNT hint per SCAN call. `None` (or `0`) uses the configured default.
    pub count: Option<u32>,
    /// Glob pattern, or a literal key name for an exact lookup.
    pub pattern: String,
    /// Only return keys of this type.
    pub data_type: Option<DataType>,
    /// Fetch TTL, size and type for each key.
    pub include_metadata: bool,
    /// Total COUNT units this page may spend. `None` uses the configured
    /// threshold.
    pub scan_budget: Option<u32>,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            cursor: "0".into(),
            count: None,
            pattern: DEFAULT_MATCH.into(),
            data_type: None,
            include_metadata: true,
            scan_budget: None,
        }
    }
}

impl ScanRequest {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = cursor.into();
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn budget(mut self, budget: u32) -> Self {
        self.scan_budget = Some(budget);
        self
    }

    pub fn names_only(mut self) -> Self {
        self.include_metadata = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_shard_address() {
        assert_eq!(
            ShardAddress::parse("172.1.0.1:7000").unwrap(),
            ShardAddress::new("172.1.0.1", 7000)
        );
        assert_eq!(
            ShardAddress::parse("[::1]:6379").unwrap(),
            ShardAddress::new("[::1]", 6379)
        );
        assert!(ShardAddress::parse("172.1.0.1asd00").is_err());
        assert!(ShardAddress::parse("host:abc").is_err());
        assert!(ShardAddress::parse(":6379").is_err());
    }

    #[test]
    fn shard_address_display_round_trips() {
        let addr = ShardAddress::new("node1.example.com", 6380);
        assert_eq!(addr.to_string(), "node1.example.com:6380");
        assert_eq!(ShardAddress::parse(&addr.to_string()).unwrap(), addr);
    }

    #[test]
    fn type_reply_none_is_missing_key() {
        assert_eq!(DataType::from_reply("none"), None);
        assert_eq!(DataType::from_reply("zset"), Some(DataType::ZSet));
        assert_eq!(DataType::from_reply("ReJSON-RL"), Some(DataType::Json));
        assert_eq!(
            DataType::from_reply("MBbloom--"),
            Some(DataType::Other("MBbloom--".into()))
        );
    }

    #[test]
    fn data_type_from_cli_names() {
        assert_eq!("json".parse::<DataType>().unwrap(), DataType::Json);
        assert_eq!("ZSET".parse::<DataType>().unwrap(), DataType::ZSet);
        assert_eq!("timeseries".parse::<DataType>().unwrap().as_str(), "TSDB-TYPE");
        assert!("none".parse::<DataType>().is_err());
    }

    #[test]
    fn page_completion_tracks_shard_states() {
        let shard = |state| ShardScanResult {
            shard: ShardAddress::new("localhost", 6379),
            cursor: 0,
            total: 0,
            scanned: 0,
            keys: vec![],
            state,
        };
        let mut page = KeysPage {
            cursor: "0".into(),
            shards: vec![shard(ShardState::Exhausted), shard(ShardState::Excluded)],
        };
        assert!(page.is_complete());

        page.shards.push(shard(ShardState::NotStarted));
        assert!(!page.is_complete());
    }

    #[test]
    fn request_builder() {
        let req = ScanRequest::new("user:*").count(50).budget(500).names_only();
        assert_eq!(req.pattern, "user:*");
        assert_eq!(req.cursor, "0");
        assert_eq!(req.count, Some(50));
        assert_eq!(req.scan_budget, Some(500));
        assert!(!req.include_metadata);
    }
}
