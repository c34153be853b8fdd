//! Metadata lookup for a batch of keys.
//!
//! One pipeline per metadata command: `TTL`, `MEMORY USAGE` and, only
//! when the caller doesn't already know it, `TYPE`.

use bytes::Bytes;
use keyscan_protocol::Frame;
use tracing::{debug, warn};

use crate::client::{command, StoreClient};
use crate::error::ScanError;
use crate::types::{DataType, KeyInfo, ShardAddress};

/// What to look up for each key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfoQuery {
    /// Type every key is already known to have (SCAN filtered by it).
    /// Skips the `TYPE` pipeline.
    pub known_type: Option<DataType>,
    /// Drop keys whose type differs from this one.
    pub type_filter: Option<DataType>,
    pub include_ttl: bool,
    pub include_size: bool,
}

impl Default for KeyInfoQuery {
    fn default() -> Self {
        Self {
            known_type: None,
            type_filter: None,
            include_ttl: true,
            include_size: true,
        }
    }
}

/// Fetches metadata for `keys` on `target` (or wherever the client routes
/// single-key commands when `None`).
///
/// Keys that vanished between SCAN and lookup (`TYPE` none, `TTL` -2) and
/// keys that fail the type filter are left out. Permission errors fail
/// the whole batch; any other error on `MEMORY USAGE` only costs the size.
pub async fn fetch<C: StoreClient>(
    client: &C,
    target: Option<&ShardAddress>,
    keys: Vec<Bytes>,
    query: &KeyInfoQuery,
) -> Result<Vec<KeyInfo>, ScanError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let ttls = if query.include_ttl {
        Some(pipeline(client, target, &keys, "TTL", |k| vec![ttl_cmd(), k]).await?)
    } else {
        None
    };
    let sizes = if query.include_size {
        Some(pipeline(client, target, &keys, "MEMORY USAGE", memory_usage).await?)
    } else {
        None
    };
    let types = if query.known_type.is_none() {
        Some(pipeline(client, target, &keys, "TYPE", |k| vec![type_cmd(), k]).await?)
    } else {
        None
    };

    let mut ttls = ttls.map(Vec::into_iter);
    let mut sizes = sizes.map(Vec::into_iter);
    let mut types = types.map(Vec::into_iter);
    let mut size_errors = 0usize;
    let mut infos = Vec::with_capacity(keys.len());

    for name in keys {
        let data_type = match types.as_mut().and_then(Iterator::next) {
            Some(reply) => parse_type(reply)?,
            None => query.known_type.clone(),
        };
        let ttl = match ttls.as_mut().and_then(Iterator::next) {
            Some(reply) => Some(parse_ttl(reply)?),
            None => None,
        };
        let size = match sizes.as_mut().and_then(Iterator::next) {
            Some(reply) => parse_size(reply, &mut size_errors)?,
            None => None,
        };

        // gone since SCAN returned it
        if data_type.is_none() || ttl == Some(-2) {
            continue;
        }
        if let Some(filter) = &query.type_filter {
            if data_type.as_ref() != Some(filter) {
                continue;
            }
        }
        infos.push(KeyInfo {
            name,
            data_type,
            ttl,
            size,
        });
    }

    if size_errors > 0 {
        warn!(keys = size_errors, "MEMORY USAGE failed, sizes left unknown");
    }
    Ok(infos)
}

async fn pipeline<C: StoreClient>(
    client: &C,
    target: Option<&ShardAddress>,
    keys: &[Bytes],
    label: &'static str,
    build: impl Fn(Bytes) -> Vec<Bytes>,
) -> Result<Vec<Frame>, ScanError> {
    let commands: Vec<Vec<Bytes>> = keys.iter().cloned().map(build).collect();
    debug!(command = label, keys = keys.len(), "metadata pipeline");
    let replies = client.send_pipeline(target, commands).await?;
    if replies.len() != keys.len() {
        return Err(ScanError::unexpected(
            label,
            format!("{} replies for {} keys", replies.len(), keys.len()),
        ));
    }
    Ok(replies)
}

fn ttl_cmd() -> Bytes {
    Bytes::from_static(b"TTL")
}

fn type_cmd() -> Bytes {
    Bytes::from_static(b"TYPE")
}

fn memory_usage(key: Bytes) -> Vec<Bytes> {
    let mut cmd = command(&["MEMORY", "USAGE"]);
    cmd.push(key);
    cmd.extend(command(&["SAMPLES", "0"]));
    cmd
}

fn parse_type(reply: Frame) -> Result<Option<DataType>, ScanError> {
    if let Some(message) = reply.error_message() {
        return Err(ScanError::from_reply(message));
    }
    let text = reply
        .as_text()
        .ok_or_else(|| ScanError::unexpected("TYPE", format!("{reply:?}")))?;
    Ok(DataType::from_reply(&text))
}

fn parse_ttl(reply: Frame) -> Result<i64, ScanError> {
    if let Some(message) = reply.error_message() {
        return Err(ScanError::from_reply(message));
    }
    reply
        .as_integer()
        .ok_or_else(|| ScanError::unexpected("TTL", format!("{reply:?}")))
}

fn parse_size(reply: Frame, errors: &mut usize) -> Result<Option<u64>, ScanError> {
    match reply {
        Frame::Error(message) => match ScanError::from_reply(&message) {
            err @ ScanError::Forbidden(_) => Err(err),
            _ => {
                *errors += 1;
                Ok(None)
            }
        },
        other => Ok(other.as_integer().and_then(|n| u64::try_from(n).ok())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStore;

    fn keys(names: &[&str]) -> Vec<Bytes> {
        names
            .iter()
            .map(|n| Bytes::copy_from_slice(n.as_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn fetches_all_three_fields() {
        let store = MockStore::standalone()
            .with_meta("user:1", "hash", 300, Some(512))
            .with_meta("queue", "list", -1, Some(96));

        let infos = fetch(&store, None, keys(&["user:1", "queue"]), &KeyInfoQuery::default())
            .await
            .unwrap();

        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].data_type, Some(DataType::Hash));
        assert_eq!(infos[0].ttl, Some(300));
        assert_eq!(infos[0].size, Some(512));
        assert_eq!(infos[1].data_type, Some(DataType::List));
        assert_eq!(infos[1].ttl, Some(-1));
        assert_eq!(store.pipelines(), 3);
    }

    #[tokio::test]
    async fn known_type_skips_the_type_pipeline() {
        let store = MockStore::standalone().with_meta("s1", "set", -1, Some(10));
        let query = KeyInfoQuery {
            known_type: Some(DataType::Set),
            ..KeyInfoQuery::default()
        };

        let infos = fetch(&store, None, keys(&["s1"]), &query).await.unwrap();

        assert_eq!(infos[0].data_type, Some(DataType::Set));
        assert_eq!(store.pipelines(), 2);
        assert_eq!(store.commands_named("TYPE"), 0);
    }

    #[tokio::test]
    async fn vanished_keys_are_dropped() {
        // "gone" has no metadata: TYPE none, TTL -2
        let store = MockStore::standalone().with_meta("here", "string", -1, Some(8));
        let infos = fetch(&store, None, keys(&["here", "gone"]), &KeyInfoQuery::default())
            .await
            .unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, Bytes::from_static(b"here"));
    }

    #[tokio::test]
    async fn expired_key_with_known_type_is_dropped() {
        let store = MockStore::standalone();
        let query = KeyInfoQuery {
            known_type: Some(DataType::String),
            ..KeyInfoQuery::default()
        };
        let infos = fetch(&store, None, keys(&["gone"]), &query).await.unwrap();
        assert!(infos.is_empty());
    }

    #[tokio::test]
    async fn type_filter_drops_mismatches() {
        let store = MockStore::standalone()
            .with_meta("a", "hash", -1, None)
            .with_meta("b", "string", -1, None);
        let query = KeyInfoQuery {
            type_filter: Some(DataType::Hash),
            ..KeyInfoQuery::default()
        };
        let infos = fetch(&store, None, keys(&["a", "b"]), &query).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, Bytes::from_static(b"a"));
    }

    #[tokio::test]
    async fn memory_usage_failure_degrades_to_unknown_size() {
        let store = MockStore::standalone()
            .with_meta("a", "string", -1, Some(8))
            .with_reply("MEMORY", Frame::Error("ERR unknown command 'MEMORY'".into()));
        let infos = fetch(&store, None, keys(&["a"]), &KeyInfoQuery::default())
            .await
            .unwrap();
        assert_eq!(infos[0].size, None);
        assert_eq!(infos[0].ttl, Some(-1));
    }

    #[tokio::test]
    async fn permission_errors_fail_the_batch() {
        let store = MockStore::standalone()
            .with_meta("a", "string", -1, Some(8))
            .with_reply("MEMORY", Frame::Error("NOPERM no memory for you".into()));
        let err = fetch(&store, None, keys(&["a"]), &KeyInfoQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Forbidden(_)));

        let store = MockStore::standalone()
            .with_meta("a", "string", -1, Some(8))
            .with_reply("TTL", Frame::Error("NOPERM no ttl for you".into()));
        let err = fetch(&store, None, keys(&["a"]), &KeyInfoQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Forbidden(_)));
    }

    #[tokio::test]
    async fn switches_skip_pipelines() {
        let store = MockStore::standalone().with_meta("a", "zset", 10, Some(8));
        let query = KeyInfoQuery {
            include_ttl: false,
            include_size: false,
            ..KeyInfoQuery::default()
        };
        let infos = fetch(&store, None, keys(&["a"]), &query).await.unwrap();
        assert_eq!(infos[0].ttl, None);
        assert_eq!(infos[0].size, None);
        assert_eq!(infos[0].data_type, Some(DataType::ZSet));
        assert_eq!(store.pipelines(), 1);
    }

    #[tokio::test]
    async fn memory_usage_uses_zero_samples() {
        let store = MockStore::standalone().with_meta("a", "string", -1, Some(8));
        fetch(&store, None, keys(&["a"]), &KeyInfoQuery::default())
            .await
            .unwrap();
        let memory: Vec<_> = store
            .commands()
            .into_iter()
            .filter(|(_, c)| c[0] == "MEMORY")
            .collect();
        assert_eq!(memory[0].1, command(&["MEMORY", "USAGE", "a", "SAMPLES", "0"]));
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let store = MockStore::standalone();
        let infos = fetch(&store, None, Vec::new(), &KeyInfoQuery::default())
            .await
            .unwrap();
        assert!(infos.is_empty());
        assert!(store.calls().is_empty());
    }
}
