//! keyscan-core: budgeted, resumable keyspace listing.
//!
//! Lists the keys of a standalone or clustered RESP store one page at a
//! time. Every page spends at most a fixed number of SCAN COUNT units
//! across all shards and returns an opaque cursor to continue from.
//! Patterns without glob metacharacters skip SCAN entirely and become a
//! direct lookup of that one key.
//!
//! ```no_run
//! use keyscan_core::{
//!     ConnectionConfig, KeyspaceScanner, ScanRequest, ScannerConfig, ShardAddress,
//!     StandaloneClient,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = StandaloneClient::connect(
//!     ShardAddress::new("127.0.0.1", 6379),
//!     ConnectionConfig::default(),
//! )
//! .await?;
//! let scanner = KeyspaceScanner::new(ScannerConfig::default());
//!
//! let mut req = ScanRequest::new("user:*");
//! loop {
//!     let page = scanner.get_keys(&client, &req).await?;
//!     for key in page.keys() {
//!         println!("{}", key.name_lossy());
//!     }
//!     if page.is_complete() {
//!         break;
//!     }
//!     req = req.cursor(page.cursor);
//! }
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod key_info;
pub mod pattern;
pub mod scanner;
pub mod shard;
pub mod slots;
pub mod types;

#[cfg(test)]
mod testing;

pub use budget::ScanBudget;
pub use client::{
    Client, ClusterClient, Connection, ConnectionError, StandaloneClient, StoreClient,
};
pub use config::{ConnectionConfig, KeyscanConfig, ScannerConfig};
pub use cursor::ShardCursor;
pub use error::{ErrorKind, ScanError};
pub use key_info::KeyInfoQuery;
pub use pattern::{classify, MatchPattern};
pub use scanner::KeyspaceScanner;
pub use types::{
    DataType, KeyInfo, KeysPage, ScanRequest, ShardAddress, ShardScanResult, ShardState,
    Topology,
};
