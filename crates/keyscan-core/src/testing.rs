//! Test doubles: a scripted in-memory store and a tiny TCP responder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use keyscan_protocol::Frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::client::StoreClient;
use crate::error::ScanError;
use crate::types::{ShardAddress, Topology};

/// One call made against the mock, as the scanner issued it.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub shard: Option<ShardAddress>,
    pub commands: Vec<Vec<Bytes>>,
    pub pipeline: bool,
}

#[derive(Debug, Clone)]
struct MockKey {
    data_type: String,
    ttl: i64,
    size: Option<u64>,
}

#[derive(Debug, Default)]
struct MockShard {
    keys: Vec<Bytes>,
    per_call: usize,
    total: Option<u64>,
}

/// An in-memory store that answers the handful of commands the scanner
/// sends and records every call.
///
/// SCAN treats the cursor as an index into the shard's key list and
/// returns `per_call` keys per call, ignoring MATCH (the store applies it)
/// and honouring TYPE.
#[derive(Debug)]
pub(crate) struct MockStore {
    topology: Topology,
    shards: Vec<MockShard>,
    meta: HashMap<Bytes, MockKey>,
    overrides: HashMap<String, Frame>,
    calls: Mutex<Vec<Call>>,
}

impl MockStore {
    pub fn standalone() -> Self {
        Self::with_topology(Topology::Standalone(ShardAddress::new("127.0.0.1", 6379)))
    }

    /// `host1:7000`, `host2:7001`, ...
    pub fn cluster(nodes: u16) -> Self {
        let shards = (1..=nodes)
            .map(|i| ShardAddress::new(format!("host{i}"), 6999 + i))
            .collect();
        Self::with_topology(Topology::Cluster(shards))
    }

    fn with_topology(topology: Topology) -> Self {
        let shards = topology.shards().iter().map(|_| MockShard::default()).collect();
        Self {
            topology,
            shards,
            meta: HashMap::new(),
            overrides: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn shard(&self, index: usize) -> ShardAddress {
        self.topology.shards()[index].clone()
    }

    /// Overrides DBSIZE for one shard.
    pub fn with_total(mut self, index: usize, total: u64) -> Self {
        self.shards[index].total = Some(total);
        self
    }

    /// Places string keys (TTL -1, 64 bytes) on a shard, served `per_call`
    /// at a time.
    pub fn with_keys(mut self, index: usize, per_call: usize, names: &[&str]) -> Self {
        for name in names {
            let key = Bytes::copy_from_slice(name.as_bytes());
            self.meta.entry(key.clone()).or_insert(MockKey {
                data_type: "string".into(),
                ttl: -1,
                size: Some(64),
            });
            self.shards[index].keys.push(key);
        }
        self.shards[index].per_call = per_call.max(1);
        self
    }

    /// Sets the metadata of a key, whether or not any shard scans it.
    pub fn with_meta(mut self, name: &str, data_type: &str, ttl: i64, size: Option<u64>) -> Self {
        self.meta.insert(
            Bytes::copy_from_slice(name.as_bytes()),
            MockKey {
                data_type: data_type.into(),
                ttl,
                size,
            },
        );
        self
    }

    /// Answers every command named `name` with `reply`.
    pub fn with_reply(mut self, name: &str, reply: Frame) -> Self {
        self.overrides.insert(name.to_ascii_uppercase(), reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every command sent, flattened across calls, with its target.
    pub fn commands(&self) -> Vec<(Option<ShardAddress>, Vec<Bytes>)> {
        self.calls()
            .into_iter()
            .flat_map(|c| {
                let shard = c.shard;
                c.commands.into_iter().map(move |cmd| (shard.clone(), cmd))
            })
            .collect()
    }

    pub fn commands_named(&self, name: &str) -> usize {
        self.commands()
            .iter()
            .filter(|(_, cmd)| is_named(cmd, name))
            .count()
    }

    /// SCAN commands sent to one shard.
    pub fn scans_on(&self, shard: &ShardAddress) -> Vec<Vec<Bytes>> {
        self.commands()
            .into_iter()
            .filter(|(s, cmd)| s.as_ref() == Some(shard) && is_named(cmd, "SCAN"))
            .map(|(_, cmd)| cmd)
            .collect()
    }

    pub fn pipelines(&self) -> usize {
        self.calls().iter().filter(|c| c.pipeline).count()
    }

    fn shard_index(&self, shard: Option<&ShardAddress>) -> Result<usize, ScanError> {
        match shard {
            None => Ok(0),
            Some(s) => self
                .topology
                .shards()
                .iter()
                .position(|a| a == s)
                .ok_or_else(|| ScanError::UnknownShard(s.to_string())),
        }
    }

    fn answer(&self, shard: usize, args: &[Bytes]) -> Frame {
        let name = args
            .first()
            .map(|a| String::from_utf8_lossy(a).to_ascii_uppercase())
            .unwrap_or_default();
        if let Some(reply) = self.overrides.get(&name) {
            return reply.clone();
        }
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();

        match name.as_str() {
            "DBSIZE" => {
                let s = &self.shards[shard];
                Frame::Integer(s.total.unwrap_or(s.keys.len() as u64) as i64)
            }
            "SCAN" => self.scan(shard, args),
            "TTL" => Frame::Integer(self.meta.get(&arg(1)).map_or(-2, |k| k.ttl)),
            "TYPE" => Frame::Simple(
                self.meta
                    .get(&arg(1))
                    .map_or("none".into(), |k| k.data_type.clone()),
            ),
            "MEMORY" => match self.meta.get(&arg(2)).and_then(|k| k.size) {
                Some(size) => Frame::Integer(size as i64),
                None => Frame::Null,
            },
            other => Frame::Error(format!("ERR unknown command '{other}'")),
        }
    }

    fn scan(&self, shard: usize, args: &[Bytes]) -> Frame {
        let text: Vec<String> = args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();
        let option = |name: &str| {
            text.iter()
                .position(|t| t.eq_ignore_ascii_case(name))
                .and_then(|i| text.get(i + 1))
        };
        let Some(start) = text.get(1).and_then(|c| c.parse::<usize>().ok()) else {
            return Frame::Error("ERR invalid cursor".into());
        };
        let type_filter = option("TYPE");

        let s = &self.shards[shard];
        let end = (start + s.per_call).min(s.keys.len());
        let names = s.keys[start.min(end)..end]
            .iter()
            .filter(|k| {
                type_filter.map_or(true, |t| {
                    self.meta.get(*k).is_some_and(|m| m.data_type == *t)
                })
            })
            .map(|k| Frame::Bulk(k.clone()))
            .collect();
        let next = if end >= s.keys.len() { 0 } else { end };
        Frame::Array(vec![
            Frame::Bulk(Bytes::from(next.to_string())),
            Frame::Array(names),
        ])
    }
}

impl StoreClient for MockStore {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn owner_of(&self, key: &[u8]) -> Option<ShardAddress> {
        self.shards
            .iter()
            .position(|s| s.keys.iter().any(|k| k.as_ref() == key))
            .map(|i| self.shard(i))
    }

    async fn send_command(
        &self,
        shard: Option<&ShardAddress>,
        args: Vec<Bytes>,
    ) -> Result<Frame, ScanError> {
        let index = self.shard_index(shard)?;
        let reply = self.answer(index, &args);
        self.calls.lock().unwrap().push(Call {
            shard: shard.cloned(),
            commands: vec![args],
            pipeline: false,
        });
        Ok(reply)
    }

    async fn send_pipeline(
        &self,
        shard: Option<&ShardAddress>,
        commands: Vec<Vec<Bytes>>,
    ) -> Result<Vec<Frame>, ScanError> {
        let index = self.shard_index(shard)?;
        let replies = commands.iter().map(|c| self.answer(index, c)).collect();
        self.calls.lock().unwrap().push(Call {
            shard: shard.cloned(),
            commands,
            pipeline: true,
        });
        Ok(replies)
    }
}

fn is_named(cmd: &[Bytes], name: &str) -> bool {
    cmd.first()
        .is_some_and(|c| c.eq_ignore_ascii_case(name.as_bytes()))
}

/// Listens on a local port and answers every read on every connection
/// with `handler(request_text)`.
pub(crate) async fn spawn_server<F>(handler: F) -> ShardAddress
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handler = Arc::new(handler);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    let reply = handler(&String::from_utf8_lossy(&buf[..n]));
                    if socket.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    ShardAddress::new("127.0.0.1", port)
}

/// Like [`spawn_server`], but answers each command of a pipelined request
/// separately. `reply` sees the command's arguments as text.
pub(crate) async fn spawn_store<F>(reply: F) -> ShardAddress
where
    F: Fn(&[String]) -> String + Send + Sync + 'static,
{
    spawn_server(move |req| request_commands(req).iter().map(|c| reply(c)).collect()).await
}

/// Splits a RESP request into commands. Arguments must be non-empty and
/// hold no CRLF.
pub(crate) fn request_commands(req: &str) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    let mut lines = req.split("\r\n").filter(|l| !l.is_empty());
    while let Some(header) = lines.next() {
        let Some(argc) = header.strip_prefix('*').and_then(|n| n.parse::<usize>().ok()) else {
            continue;
        };
        let args: Vec<String> = (0..argc)
            .filter_map(|_| {
                lines.next()?;
                lines.next().map(str::to_string)
            })
            .collect();
        commands.push(args);
    }
    commands
}
