//! A single TCP connection to one store node.
//!
//! Commands go out as RESP arrays of bulk strings; replies are read back
//! with the incremental parser. Error replies come back as
//! [`Frame::Error`] values, not as `Err`: classifying them is the
//! caller's job.

use std::future::Future;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use keyscan_protocol::{encode_command, encode_pipeline, parse_frame, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::types::ShardAddress;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server disconnected")]
    Disconnected,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// A buffered connection to one node.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    command_timeout: Option<Duration>,
}

impl Connection {
    /// Connects, authenticates when a password is configured, and selects
    /// `select_db` when given.
    pub async fn connect(
        addr: &ShardAddress,
        config: &ConnectionConfig,
        select_db: Option<u32>,
    ) -> Result<Self, ConnectionError> {
        // TcpStream wants bare IPv6 literals
        let host = addr.host.trim_start_matches('[').trim_end_matches(']');
        let stream = with_timeout(
            "connect",
            Some(config.connect_timeout()),
            TcpStream::connect((host, addr.port)),
        )
        .await??;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected");

        let mut conn = Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
            command_timeout: config.command_timeout(),
        };

        if let Some(password) = &config.password {
            conn.authenticate(config.username.as_deref(), password)
                .await?;
        }
        if let Some(db) = select_db.filter(|&db| db != 0) {
            conn.select(db).await?;
        }
        Ok(conn)
    }

    /// Sends `AUTH [username] password`.
    pub async fn authenticate(
        &mut self,
        username: Option<&str>,
        password: &str,
    ) -> Result<(), ConnectionError> {
        let mut args = vec![Bytes::from_static(b"AUTH")];
        if let Some(user) = username {
            args.push(Bytes::copy_from_slice(user.as_bytes()));
        }
        args.push(Bytes::copy_from_slice(password.as_bytes()));

        match self.send_command(&args).await? {
            Frame::Simple(s) if s == "OK" => Ok(()),
            Frame::Error(e) => Err(ConnectionError::AuthFailed(e)),
            _ => Err(ConnectionError::AuthFailed(
                "unexpected response to AUTH".into(),
            )),
        }
    }

    /// Switches to logical database `db`.
    pub async fn select(&mut self, db: u32) -> Result<(), ConnectionError> {
        let args = [
            Bytes::from_static(b"SELECT"),
            Bytes::from(db.to_string()),
        ];
        match self.send_command(&args).await? {
            Frame::Simple(s) if s == "OK" => Ok(()),
            other => Err(ConnectionError::Protocol(format!(
                "SELECT {db} failed: {}",
                other.error_message().unwrap_or("unexpected reply")
            ))),
        }
    }

    /// Sends one command and reads its reply.
    pub async fn send_command(&mut self, args: &[Bytes]) -> Result<Frame, ConnectionError> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);
        let timeout = self.command_timeout;
        with_timeout("command", timeout, async {
            self.flush_writes().await?;
            self.read_response().await
        })
        .await?
    }

    /// Writes every command in one batch, then reads one reply per command.
    pub async fn send_pipeline(
        &mut self,
        commands: &[Vec<Bytes>],
    ) -> Result<Vec<Frame>, ConnectionError> {
        self.write_buf.clear();
        encode_pipeline(commands, &mut self.write_buf);
        let timeout = self.command_timeout;
        with_timeout("pipeline", timeout, async {
            self.flush_writes().await?;
            let mut replies = Vec::with_capacity(commands.len());
            for _ in commands {
                replies.push(self.read_response().await?);
            }
            Ok(replies)
        })
        .await?
    }

    async fn flush_writes(&mut self) -> Result<(), ConnectionError> {
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Frame, ConnectionError> {
        loop {
            if !self.read_buf.is_empty() {
                match parse_frame(&self.read_buf) {
                    Ok(Some((frame, consumed))) => {
                        self.read_buf.advance(consumed);
                        return Ok(frame);
                    }
                    Ok(None) => {}
                    Err(e) => return Err(ConnectionError::Protocol(e.to_string())),
                }
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(ConnectionError::Disconnected);
            }
        }
    }
}

async fn with_timeout<F: Future>(
    operation: &'static str,
    limit: Option<Duration>,
    fut: F,
) -> Result<F::Output, ConnectionError> {
    match limit {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| ConnectionError::Timeout { operation, after }),
        None => Ok(fut.await),
    }
}
