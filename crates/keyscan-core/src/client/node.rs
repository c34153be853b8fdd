use bytes::Bytes;
use keyscan_protocol::Frame;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::connection::{Connection, ConnectionError};
use crate::config::ConnectionConfig;
use crate::types::ShardAddress;

/// A node address plus its lazily (re)established connection.
///
/// Commands are serialized over the one connection. A connection that
/// fails mid-command is dropped and re-established on the next call, so
/// a half-read pipeline never leaks replies into a later request.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) address: ShardAddress,
    config: ConnectionConfig,
    select_db: Option<u32>,
    conn: Mutex<Option<Connection>>,
}

impl Node {
    pub(crate) fn new(address: ShardAddress, config: ConnectionConfig, select_db: Option<u32>) -> Self {
        Self {
            address,
            config,
            select_db,
            conn: Mutex::new(None),
        }
    }

    /// Opens the connection now rather than on first use.
    pub(crate) async fn connect(&self) -> Result<(), ConnectionError> {
        self.lock().await.map(drop)
    }

    pub(crate) async fn send_command(&self, args: &[Bytes]) -> Result<Frame, ConnectionError> {
        let mut guard = self.lock().await?;
        let result = match guard.as_mut() {
            Some(conn) => conn.send_command(args).await,
            None => Err(ConnectionError::Disconnected),
        };
        self.settle(&mut guard, result)
    }

    pub(crate) async fn send_pipeline(
        &self,
        commands: &[Vec<Bytes>],
    ) -> Result<Vec<Frame>, ConnectionError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.lock().await?;
        let result = match guard.as_mut() {
            Some(conn) => conn.send_pipeline(commands).await,
            None => Err(ConnectionError::Disconnected),
        };
        self.settle(&mut guard, result)
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, ConnectionError> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(Connection::connect(&self.address, &self.config, self.select_db).await?);
        }
        Ok(guard)
    }

    fn settle<T>(
        &self,
        slot: &mut Option<Connection>,
        result: Result<T, ConnectionError>,
    ) -> Result<T, ConnectionError> {
        if let Err(e) = &result {
            warn!(addr = %self.address, error = %e, "dropping connection");
            *slot = None;
        }
        result
    }
}
