//! The store capability the scanner runs against.
//!
//! [`StoreClient`] is the seam: the scanner only ever talks to a store
//! through it. [`Client`] is the concrete, tagged choice between a
//! standalone node and a cluster; tests plug in a scripted store instead.

mod cluster;
mod connection;
mod node;
mod standalone;

pub use cluster::ClusterClient;
pub use connection::{Connection, ConnectionError};
pub use standalone::StandaloneClient;

use bytes::Bytes;
use keyscan_protocol::Frame;
use tracing::debug;

use crate::error::ScanError;
use crate::types::{ShardAddress, Topology};

/// What the scanner needs from a store.
///
/// `shard` selects the node a command runs on. `None` means "route it the
/// way you route single-key commands": the only node for a standalone
/// store, the key's slot owner for a cluster.
///
/// Error replies are returned as [`Frame::Error`] values so that callers
/// can decide per reply whether an error is fatal.
#[allow(async_fn_in_trait)]
pub trait StoreClient {
    fn topology(&self) -> &Topology;

    fn list_shards(&self) -> &[ShardAddress] {
        self.topology().shards()
    }

    /// The shard that owns `key`, when the client can tell.
    fn owner_of(&self, _key: &[u8]) -> Option<ShardAddress> {
        None
    }

    async fn send_command(
        &self,
        shard: Option<&ShardAddress>,
        args: Vec<Bytes>,
    ) -> Result<Frame, ScanError>;

    async fn send_pipeline(
        &self,
        shard: Option<&ShardAddress>,
        commands: Vec<Vec<Bytes>>,
    ) -> Result<Vec<Frame>, ScanError>;

    /// Constant-time estimate of the number of keys on `shard`.
    ///
    /// Uses `DBSIZE`, falling back to the `keys=` counts of
    /// `INFO keyspace` when `DBSIZE` is refused.
    async fn total_keys(&self, shard: Option<&ShardAddress>) -> Result<u64, ScanError> {
        let reply = self.send_command(shard, command(&["DBSIZE"])).await?;
        if let Some(message) = reply.error_message() {
            debug!(error = message, "DBSIZE rejected, falling back to INFO keyspace");
            let info = expect_ok(
                self.send_command(shard, command(&["INFO", "keyspace"])).await?,
            )?;
            let text = info
                .as_text()
                .ok_or_else(|| ScanError::unexpected("INFO", "expected a bulk string"))?;
            return Ok(keyspace_total(&text));
        }
        reply
            .as_integer()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| ScanError::unexpected("DBSIZE", format!("{reply:?}")))
    }
}

/// A connected store of either flavour.
#[derive(Debug)]
pub enum Client {
    Standalone(StandaloneClient),
    Cluster(ClusterClient),
}

impl StoreClient for Client {
    fn topology(&self) -> &Topology {
        match self {
            Client::Standalone(c) => c.topology(),
            Client::Cluster(c) => c.topology(),
        }
    }

    fn owner_of(&self, key: &[u8]) -> Option<ShardAddress> {
        match self {
            Client::Standalone(c) => c.owner_of(key),
            Client::Cluster(c) => c.owner_of(key),
        }
    }

    async fn send_command(
        &self,
        shard: Option<&ShardAddress>,
        args: Vec<Bytes>,
    ) -> Result<Frame, ScanError> {
        match self {
            Client::Standalone(c) => c.send_command(shard, args).await,
            Client::Cluster(c) => c.send_command(shard, args).await,
        }
    }

    async fn send_pipeline(
        &self,
        shard: Option<&ShardAddress>,
        commands: Vec<Vec<Bytes>>,
    ) -> Result<Vec<Frame>, ScanError> {
        match self {
            Client::Standalone(c) => c.send_pipeline(shard, commands).await,
            Client::Cluster(c) => c.send_pipeline(shard, commands).await,
        }
    }
}

impl From<StandaloneClient> for Client {
    fn from(c: StandaloneClient) -> Self {
        Client::Standalone(c)
    }
}

impl From<ClusterClient> for Client {
    fn from(c: ClusterClient) -> Self {
        Client::Cluster(c)
    }
}

/// Builds a command from string parts.
pub(crate) fn command(parts: &[&str]) -> Vec<Bytes> {
    parts
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect()
}

/// Turns an error reply into a [`ScanError`], passing other frames through.
pub(crate) fn expect_ok(frame: Frame) -> Result<Frame, ScanError> {
    match frame {
        Frame::Error(message) => Err(ScanError::from_reply(&message)),
        other => Ok(other),
    }
}

/// Sums the `keys=` counts of an `INFO keyspace` section.
///
/// ```text
/// # Keyspace
/// db0:keys=120,expires=3,avg_ttl=0
/// ```
fn keyspace_total(info: &str) -> u64 {
    info.lines()
        .filter(|line| line.starts_with("db"))
        .filter_map(|line| {
            let (_, fields) = line.split_once(':')?;
            fields
                .split(',')
                .find_map(|f| f.strip_prefix("keys="))
                .and_then(|n| n.trim().parse::<u64>().ok())
        })
        .sum()
}
