//! Client for a slot-sharded cluster.
//!
//! Each primary is a [`Node`] with the slot ranges it serves. Commands with
//! an explicit target go straight to that node. Untargeted single-key
//! commands are routed by hash slot, a pipeline split into one batch per
//! owning node, and each reply follows at most one `MOVED` or `ASK`
//! redirect. Slots learned from `MOVED` replies override the static ranges.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use keyscan_protocol::Frame;
use tracing::{debug, info, warn};

use super::connection::ConnectionError;
use super::node::Node;
use super::{command, expect_ok, StoreClient};
use crate::config::ConnectionConfig;
use crate::error::ScanError;
use crate::slots::{key_slot, SlotRange};
use crate::types::{ShardAddress, Topology};

#[derive(Debug)]
struct ClusterNode {
    node: Node,
    slots: Vec<SlotRange>,
}

#[derive(Debug)]
pub struct ClusterClient {
    topology: Topology,
    nodes: Vec<ClusterNode>,
    /// slot -> node index, from `MOVED` replies
    moved: Mutex<HashMap<u16, usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RedirectKind {
    /// The slot lives elsewhere for good.
    Moved,
    /// The slot is migrating; retry once on the target, preceded by ASKING.
    Ask,
}

/// A redirect reply from a node that doesn't own a key's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Redirect {
    kind: RedirectKind,
    slot: u16,
    target: ShardAddress,
}

impl Redirect {
    /// Parses `MOVED <slot> <host:port>` or `ASK <slot> <host:port>`.
    fn parse(message: &str) -> Option<Self> {
        let mut parts = message.split_whitespace();
        let kind = match parts.next()? {
            "MOVED" => RedirectKind::Moved,
            "ASK" => RedirectKind::Ask,
            _ => return None,
        };
        let slot = parts.next()?.parse().ok()?;
        let target = ShardAddress::parse(parts.next()?).ok()?;
        Some(Self { kind, slot, target })
    }

    fn from_frame(frame: &Frame) -> Option<Self> {
        frame.error_message().and_then(Self::parse)
    }
}

impl ClusterClient {
    /// Builds a client over known primaries without connecting. Nodes
    /// with no slot ranges still get commands routed to them explicitly;
    /// untargeted commands for slots nobody claims go to the first node
    /// and rely on its redirect.
    pub fn new(nodes: Vec<(ShardAddress, Vec<SlotRange>)>, config: ConnectionConfig) -> Self {
        let topology = Topology::Cluster(nodes.iter().map(|(addr, _)| addr.clone()).collect());
        let nodes = nodes
            .into_iter()
            .map(|(addr, slots)| ClusterNode {
                node: Node::new(addr, config.clone(), None),
                slots,
            })
            .collect();
        Self {
            topology,
            nodes,
            moved: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a client and connects to every node up front.
    pub async fn connect(
        nodes: Vec<(ShardAddress, Vec<SlotRange>)>,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        let client = Self::new(nodes, config);
        for n in &client.nodes {
            n.node.connect().await?;
        }
        info!(nodes = client.nodes.len(), "connected to cluster");
        Ok(client)
    }

    /// Asks the first reachable seed for `CLUSTER SLOTS` and connects to
    /// every primary it reports.
    pub async fn discover(seeds: &[ShardAddress], config: ConnectionConfig) -> Result<Self, ScanError> {
        let mut last_err: Option<ScanError> = None;
        for seed in seeds {
            let probe = Node::new(seed.clone(), config.clone(), None);
            let reply = match probe.send_command(&command(&["CLUSTER", "SLOTS"])).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(%seed, error = %e, "seed unreachable");
                    last_err = Some(e.into());
                    continue;
                }
            };
            let primaries = parse_cluster_slots(expect_ok(reply)?, seed)?;
            debug!(%seed, primaries = primaries.len(), "discovered cluster layout");
            return Ok(Self::connect(primaries, config).await?);
        }
        Err(last_err.unwrap_or_else(|| ScanError::NoRoute("CLUSTER SLOTS".into())))
    }

    fn node_index(&self, addr: &ShardAddress) -> Result<usize, ScanError> {
        self.nodes
            .iter()
            .position(|n| n.node.address == *addr)
            .ok_or_else(|| ScanError::UnknownShard(addr.to_string()))
    }

    fn slot_owner(&self, key: &[u8]) -> Option<usize> {
        let slot = key_slot(key);
        let learned = self
            .moved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot)
            .copied();
        learned.or_else(|| {
            self.nodes
                .iter()
                .position(|n| n.slots.iter().any(|r| r.contains(slot)))
        })
    }

    fn learn(&self, slot: u16, node: usize) {
        self.moved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot, node);
    }

    /// Picks the node for an untargeted command by its key.
    fn route(&self, args: &[Bytes]) -> Result<usize, ScanError> {
        let Some(key) = command_key(args) else {
            let name = args
                .first()
                .map(|a| String::from_utf8_lossy(a).into_owned())
                .unwrap_or_default();
            return Err(ScanError::NoRoute(name));
        };
        match self.slot_owner(key) {
            Some(index) => Ok(index),
            None if !self.nodes.is_empty() => Ok(0),
            None => Err(ScanError::NoRoute("command on an empty cluster".into())),
        }
    }

    /// Sends untargeted commands: one pipeline per owning node, then one
    /// batch per redirect target. Replies come back in command order.
    async fn send_routed(&self, commands: &[Vec<Bytes>]) -> Result<Vec<Frame>, ScanError> {
        let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
        for (i, cmd) in commands.iter().enumerate() {
            let node = self.route(cmd)?;
            match groups.iter_mut().find(|(n, _)| *n == node) {
                Some((_, indices)) => indices.push(i),
                None => groups.push((node, vec![i])),
            }
        }

        let mut replies: Vec<Option<Frame>> = vec![None; commands.len()];
        let mut redirected: Vec<(usize, Redirect)> = Vec::new();
        for (node, indices) in groups {
            let batch: Vec<Vec<Bytes>> = indices.iter().map(|&i| commands[i].clone()).collect();
            let got = self.send_batch(node, &batch).await?;
            for (i, reply) in indices.into_iter().zip(got) {
                match Redirect::from_frame(&reply) {
                    Some(redirect) => redirected.push((i, redirect)),
                    None => replies[i] = Some(reply),
                }
            }
        }
        if !redirected.is_empty() {
            self.follow(commands, redirected, &mut replies).await?;
        }

        replies
            .into_iter()
            .map(|r| r.ok_or_else(|| ScanError::unexpected("pipeline", "missing reply")))
            .collect()
    }

    /// Retries redirected commands once on their targets. A second
    /// redirect is returned to the caller as an error reply.
    async fn follow(
        &self,
        commands: &[Vec<Bytes>],
        redirected: Vec<(usize, Redirect)>,
        replies: &mut [Option<Frame>],
    ) -> Result<(), ScanError> {
        debug!(commands = redirected.len(), "following redirects");
        let mut groups: Vec<(usize, RedirectKind, Vec<usize>)> = Vec::new();
        for (i, redirect) in redirected {
            let target = self.node_index(&redirect.target)?;
            if redirect.kind == RedirectKind::Moved {
                self.learn(redirect.slot, target);
            }
            match groups
                .iter_mut()
                .find(|(t, k, _)| *t == target && *k == redirect.kind)
            {
                Some((_, _, indices)) => indices.push(i),
                None => groups.push((target, redirect.kind, vec![i])),
            }
        }

        for (target, kind, indices) in groups {
            let got = match kind {
                RedirectKind::Moved => {
                    let batch: Vec<Vec<Bytes>> =
                        indices.iter().map(|&i| commands[i].clone()).collect();
                    self.send_batch(target, &batch).await?
                }
                RedirectKind::Ask => {
                    // ASKING only covers the command right after it
                    let batch: Vec<Vec<Bytes>> = indices
                        .iter()
                        .flat_map(|&i| [asking(), commands[i].clone()])
                        .collect();
                    let got = self.send_batch(target, &batch).await?;
                    got.into_iter().skip(1).step_by(2).collect()
                }
            };
            for (i, reply) in indices.into_iter().zip(got) {
                replies[i] = Some(reply);
            }
        }
        Ok(())
    }

    async fn send_batch(&self, node: usize, batch: &[Vec<Bytes>]) -> Result<Vec<Frame>, ScanError> {
        let got = self.nodes[node].node.send_pipeline(batch).await?;
        if got.len() != batch.len() {
            return Err(ScanError::unexpected(
                "pipeline",
                format!("{} replies for {} commands", got.len(), batch.len()),
            ));
        }
        Ok(got)
    }
}

impl StoreClient for ClusterClient {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn owner_of(&self, key: &[u8]) -> Option<ShardAddress> {
        self.slot_owner(key).map(|i| self.nodes[i].node.address.clone())
    }

    async fn send_command(
        &self,
        shard: Option<&ShardAddress>,
        args: Vec<Bytes>,
    ) -> Result<Frame, ScanError> {
        if let Some(addr) = shard {
            let node = self.node_index(addr)?;
            return Ok(self.nodes[node].node.send_command(&args).await?);
        }
        self.send_routed(&[args])
            .await?
            .pop()
            .ok_or_else(|| ScanError::unexpected("command", "missing reply"))
    }

    async fn send_pipeline(
        &self,
        shard: Option<&ShardAddress>,
        commands: Vec<Vec<Bytes>>,
    ) -> Result<Vec<Frame>, ScanError> {
        match shard {
            Some(addr) => {
                let node = self.node_index(addr)?;
                Ok(self.nodes[node].node.send_pipeline(&commands).await?)
            }
            None => self.send_routed(&commands).await,
        }
    }
}

fn asking() -> Vec<Bytes> {
    command(&["ASKING"])
}

/// The key argument of the single-key commands the scanner sends.
fn command_key(args: &[Bytes]) -> Option<&[u8]> {
    let name = args.first()?;
    let index = if name.eq_ignore_ascii_case(b"MEMORY") { 2 } else { 1 };
    args.get(index).map(|k| k.as_ref())
}

/// Extracts primaries and their slot ranges from a `CLUSTER SLOTS` reply:
/// `[[start, end, [host, port, id], replica...], ...]`.
fn parse_cluster_slots(
    reply: Frame,
    seed: &ShardAddress,
) -> Result<Vec<(ShardAddress, Vec<SlotRange>)>, ScanError> {
    let bad = |detail: &str| ScanError::unexpected("CLUSTER SLOTS", detail.to_string());
    let entries = reply.into_array().ok_or_else(|| bad("expected an array"))?;

    let mut primaries: Vec<(ShardAddress, Vec<SlotRange>)> = Vec::new();
    for entry in entries {
        let mut fields = entry
            .into_array()
            .ok_or_else(|| bad("expected a slot entry"))?
            .into_iter();
        let start = fields.next().and_then(|f| f.as_integer());
        let end = fields.next().and_then(|f| f.as_integer());
        let primary = fields.next().and_then(Frame::into_array);
        let (Some(start), Some(end), Some(primary)) = (start, end, primary) else {
            return Err(bad("incomplete slot entry"));
        };

        let mut primary = primary.into_iter();
        let host = primary.next().and_then(|f| f.as_text());
        let port = primary.next().and_then(|f| f.as_integer());
        let (Some(host), Some(port)) = (host, port) else {
            return Err(bad("incomplete node entry"));
        };
        // an empty host means "the address you reached me on"
        let host = if host.is_empty() || host == "?" {
            seed.host.clone()
        } else {
            host
        };
        let port = u16::try_from(port).map_err(|_| bad("port out of range"))?;
        let addr = ShardAddress::new(host, port);

        let range = u16::try_from(start)
            .ok()
            .zip(u16::try_from(end).ok())
            .ok_or_else(|| bad("slot out of range"))
            .and_then(|(s, e)| SlotRange::new(s, e).map_err(|e| bad(&e)))?;

        match primaries.iter_mut().find(|(a, _)| *a == addr) {
            Some((_, ranges)) => ranges.push(range),
            None => primaries.push((addr, vec![range])),
        }
    }
    Ok(primaries)
}
