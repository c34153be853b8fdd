//! Client for a single, non-clustered node.

use bytes::Bytes;
use keyscan_protocol::Frame;
use tracing::info;

use super::connection::ConnectionError;
use super::node::Node;
use super::StoreClient;
use crate::config::ConnectionConfig;
use crate::error::ScanError;
use crate::types::{ShardAddress, Topology};

#[derive(Debug)]
pub struct StandaloneClient {
    topology: Topology,
    node: Node,
}

impl StandaloneClient {
    /// Connects to `addr`, authenticating and selecting the configured
    /// database.
    pub async fn connect(addr: ShardAddress, config: ConnectionConfig) -> Result<Self, ConnectionError> {
        let db = config.db;
        let node = Node::new(addr.clone(), config, Some(db));
        node.connect().await?;
        info!(%addr, db, "connected to standalone store");
        Ok(Self {
            topology: Topology::Standalone(addr),
            node,
        })
    }

    fn check_target(&self, shard: Option<&ShardAddress>) -> Result<(), ScanError> {
        match shard {
            Some(s) if *s != self.node.address => Err(ScanError::UnknownShard(s.to_string())),
            _ => Ok(()),
        }
    }
}

impl StoreClient for StandaloneClient {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn owner_of(&self, _key: &[u8]) -> Option<ShardAddress> {
        Some(self.node.address.clone())
    }

    async fn send_command(
        &self,
        shard: Option<&ShardAddress>,
        args: Vec<Bytes>,
    ) -> Result<Frame, ScanError> {
        self.check_target(shard)?;
        Ok(self.node.send_command(&args).await?)
    }

    async fn send_pipeline(
        &self,
        shard: Option<&ShardAddress>,
        commands: Vec<Vec<Bytes>>,
    ) -> Result<Vec<Frame>, ScanError> {
        self.check_target(shard)?;
        Ok(self.node.send_pipeline(&commands).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::command;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every read with the next canned reply; a `None` reply
    /// closes the connection and waits for the client to come back.
    async fn server(replies: Vec<Option<&'static [u8]>>) -> ShardAddress {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut replies = replies.into_iter();
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                loop {
                    let mut buf = [0u8; 1024];
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                    match replies.next() {
                        Some(Some(reply)) => socket.write_all(reply).await.unwrap(),
                        _ => break,
                    }
                }
            }
        });
        ShardAddress::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn sends_to_its_only_shard() {
        let addr = server(vec![Some(b":3\r\n")]).await;
        let client = StandaloneClient::connect(addr.clone(), ConnectionConfig::default())
            .await
            .unwrap();

        assert_eq!(client.total_keys(Some(&addr)).await.unwrap(), 3);
        assert_eq!(client.owner_of(b"anything"), Some(addr));
    }

    #[tokio::test]
    async fn rejects_foreign_shards() {
        let addr = server(vec![]).await;
        let client = StandaloneClient::connect(addr, ConnectionConfig::default())
            .await
            .unwrap();

        let other = ShardAddress::new("10.0.0.9", 6379);
        let err = client
            .send_command(Some(&other), command(&["DBSIZE"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::UnknownShard(s) if s == "10.0.0.9:6379"));
    }

    #[tokio::test]
    async fn reconnects_after_a_dropped_connection() {
        let addr = server(vec![None, Some(b":11\r\n")]).await;
        let client = StandaloneClient::connect(addr, ConnectionConfig::default())
            .await
            .unwrap();

        let err = client.send_command(None, command(&["DBSIZE"])).await.unwrap_err();
        assert!(err.is_transient());

        let reply = client.send_command(None, command(&["DBSIZE"])).await.unwrap();
        assert_eq!(reply, Frame::Integer(11));
    }
}
