//! Page-level orchestration: one "get keys" request across every shard.

use bytes::Bytes;
use tracing::debug;

use crate::budget::ScanBudget;
use crate::client::StoreClient;
use crate::config::ScannerConfig;
use crate::cursor::{self, ShardCursor};
use crate::error::ScanError;
use crate::key_info::{self, KeyInfoQuery};
use crate::pattern::{classify, MatchPattern};
use crate::shard::{scan_shard, ScanParams};
use crate::types::{
    DataType, KeyInfo, KeysPage, ScanRequest, ShardScanResult, ShardState, DEFAULT_MATCH,
};

/// Lists keys page by page with a bounded amount of store-side work per
/// page.
///
/// Holds only configuration; every request builds its own budget and
/// cursor state, so one scanner can serve any number of clients.
#[derive(Debug, Clone, Default)]
pub struct KeyspaceScanner {
    config: ScannerConfig,
}

impl KeyspaceScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Returns one page of keys and the cursor for the next one.
    ///
    /// A glob pattern scans shards in cursor order under one shared
    /// budget. A pattern with no glob metacharacters is looked up directly
    /// instead: no SCAN, no budget, one result on the shard owning it.
    pub async fn get_keys<C: StoreClient>(
        &self,
        client: &C,
        req: &ScanRequest,
    ) -> Result<KeysPage, ScanError> {
        let topology = client.topology();
        let entries = cursor::decode(&req.cursor, topology)?;
        let pattern = match req.pattern.as_str() {
            "" => DEFAULT_MATCH,
            p => p,
        };

        let shards = match classify(pattern) {
            MatchPattern::Literal(key) => self.lookup(client, &entries, key, req).await?,
            MatchPattern::Glob(glob) => self.scan(client, &entries, &glob, req).await?,
        };

        let next: Vec<ShardCursor> = shards
            .iter()
            .map(|s| ShardCursor::new(s.shard.clone(), s.cursor))
            .collect();
        let page = KeysPage {
            cursor: cursor::encode(&next, topology),
            shards,
        };
        debug!(
            pattern,
            cursor = %page.cursor,
            scanned = page.scanned(),
            keys = page.keys().count(),
            complete = page.is_complete(),
            "page done"
        );
        Ok(page)
    }

    /// Looks up metadata for caller-supplied keys.
    ///
    /// `data_type` is taken as the known type of every key, which skips the
    /// `TYPE` round trip.
    pub async fn get_keys_info<C: StoreClient>(
        &self,
        client: &C,
        keys: Vec<Bytes>,
        data_type: Option<DataType>,
        include_ttl: bool,
        include_size: bool,
    ) -> Result<Vec<KeyInfo>, ScanError> {
        let query = KeyInfoQuery {
            known_type: data_type,
            type_filter: None,
            include_ttl,
            include_size,
        };
        key_info::fetch(client, None, keys, &query).await
    }

    async fn scan<C: StoreClient>(
        &self,
        client: &C,
        entries: &[ShardCursor],
        glob: &str,
        req: &ScanRequest,
    ) -> Result<Vec<ShardScanResult>, ScanError> {
        let count = self.config.effective_count(req.count);
        let mut budget = ScanBudget::new(self.config.effective_budget(req.scan_budget, count));
        let params = ScanParams {
            pattern: glob,
            count,
            data_type: req.data_type.as_ref(),
        };
        // SCAN already applied TYPE, so the type is known for every key
        let query = KeyInfoQuery {
            known_type: req.data_type.clone(),
            type_filter: req.data_type.clone(),
            ..KeyInfoQuery::default()
        };

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let scan = scan_shard(client, entry, &params, &mut budget).await?;
            let keys = if req.include_metadata {
                key_info::fetch(client, Some(&scan.shard), scan.names, &query).await?
            } else {
                scan.names
                    .into_iter()
                    .map(|name| KeyInfo::name_only(name, req.data_type.clone()))
                    .collect()
            };
            results.push(ShardScanResult {
                shard: scan.shard,
                cursor: scan.cursor,
                total: scan.total,
                scanned: scan.scanned,
                keys,
                state: scan.state,
            });
        }
        Ok(results)
    }

    async fn lookup<C: StoreClient>(
        &self,
        client: &C,
        entries: &[ShardCursor],
        key: Bytes,
        req: &ScanRequest,
    ) -> Result<Vec<ShardScanResult>, ScanError> {
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let (total, state) = if entry.is_excluded() {
                (0, ShardState::Excluded)
            } else {
                let total = client.total_keys(Some(&entry.shard)).await?;
                (total, ShardState::Exhausted)
            };
            results.push(ShardScanResult {
                shard: entry.shard.clone(),
                cursor: entry.cursor,
                total,
                scanned: total,
                keys: Vec::new(),
                state,
            });
        }

        // nothing pre-filtered this key, so TYPE is always checked
        let query = KeyInfoQuery {
            known_type: None,
            type_filter: req.data_type.clone(),
            include_ttl: req.include_metadata,
            include_size: req.include_metadata,
        };
        let mut found = key_info::fetch(client, None, vec![key.clone()], &query).await?;
        if !req.include_metadata {
            for info in &mut found {
                info.data_type = req.data_type.clone();
            }
        }

        let owner = client.owner_of(&key);
        let index = owner
            .and_then(|o| results.iter().position(|r| r.shard == o))
            .unwrap_or(0);
        if let Some(result) = results.get_mut(index) {
            result.keys = found;
        }
        Ok(results)
    }
}
