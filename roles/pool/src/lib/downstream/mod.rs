//! ## Downstream
//!
//! TCP side of the pool. [`Downstream`] accepts miner connections; each one gets a
//! [`StratumConnection`] (line-delimited JSON reader and writer tasks), a [`TcpTransport`] used
//! by broadcasts to push jobs, and a task that feeds incoming requests to a
//! [`SessionHandler`] in arrival order.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_channel::{bounded, unbounded, Receiver, Sender};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use stratum_rpc::{
    json_rpc::{Message, Notification},
    IsServer,
};
use tokio::{
    io::{AsyncWriteExt, BufReader, BufWriter},
    net::{TcpListener, TcpStream},
    time::Instant,
};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::PoolConfig,
    error::{PoolError, PoolResult},
    mining_pool::{message_handler::SessionHandler, StratumServer},
    session::{Session, Transport},
    status,
    utils::Mutex,
};

const MAX_LINE_LENGTH: usize = 1 << 16;

/// Messages waiting to be written to one miner.
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Line-delimited JSON-RPC over a TCP stream.
///
/// Incoming lines are parsed into [`Message`]s by a reader task, outgoing messages are
/// serialized by a writer task. When either task stops both channels are closed.
#[derive(Debug)]
pub struct StratumConnection {
    receiver: Receiver<Message>,
    sender: Sender<Message>,
}

impl StratumConnection {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (sender_incoming, receiver_incoming) = unbounded();
        let (sender_outgoing, receiver_outgoing) = bounded(OUTBOUND_QUEUE_CAPACITY);

        let reader = BufReader::new(read_half);
        let writer = BufWriter::new(write_half);

        tokio::spawn(async move {
            tokio::select! {
                _ = Self::run_reader(reader, sender_incoming.clone()) => {
                    trace!("Reader task exited, closing connection");
                }
                _ = Self::run_writer(writer, receiver_outgoing.clone()) => {
                    trace!("Writer task exited, closing connection");
                }
            }
            sender_incoming.close();
            receiver_outgoing.close();
        });

        Self {
            receiver: receiver_incoming,
            sender: sender_outgoing,
        }
    }

    async fn run_reader(
        reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
        sender: Sender<Message>,
    ) {
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        while let Some(result) = lines.next().await {
            match result {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => match serde_json::from_str::<Message>(&line) {
                    Ok(msg) => {
                        if sender.send(msg).await.is_err() {
                            warn!("Receiver dropped, stopping reader");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to deserialize message: {e:?}");
                    }
                },
                Err(e) => {
                    error!("Error reading from stream: {e:?}");
                    break;
                }
            }
        }
    }

    async fn run_writer(
        mut writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
        receiver: Receiver<Message>,
    ) {
        while let Ok(msg) = receiver.recv().await {
            match serde_json::to_string(&msg) {
                Ok(line) => {
                    let data = format!("{line}\n");
                    if writer.write_all(data.as_bytes()).await.is_err() {
                        error!("Failed to write to stream");
                        break;
                    }
                    if writer.flush().await.is_err() {
                        error!("Failed to flush writer.");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {e:?}");
                    break;
                }
            }
        }
    }

    /// Receive a message from the miner, `None` once the connection is gone.
    pub async fn receive(&self) -> Option<Message> {
        self.receiver.recv().await.ok()
    }

    pub fn sender(&self) -> Sender<Message> {
        self.sender.clone()
    }

    pub fn close(&self) {
        self.receiver.close();
        self.sender.close();
    }
}

/// Outbound handle on a [`StratumConnection`] plus the connection's idle deadline.
pub struct TcpTransport {
    sender: Sender<Message>,
    remote_addr: SocketAddr,
    write_timeout: Duration,
    idle_timeout: Duration,
    deadline: Mutex<Instant>,
}

impl TcpTransport {
    pub fn new(
        sender: Sender<Message>,
        remote_addr: SocketAddr,
        write_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            remote_addr,
            write_timeout,
            idle_timeout,
            deadline: Mutex::new(Instant::now() + idle_timeout),
        }
    }

    /// Queues `msg` for the writer. Fails if the connection is closed or the queue stays full
    /// for longer than the write timeout.
    pub async fn send(&self, msg: Message) -> PoolResult<()> {
        match tokio::time::timeout(self.write_timeout, self.sender.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PoolError::TransportClosed(self.remote_addr.to_string())),
            Err(_) => Err(PoolError::TransportTimeout(self.remote_addr.to_string())),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline.super_safe_lock(|deadline| *deadline)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn push_message(&self, method: &str, payload: Value) -> PoolResult<()> {
        self.send(Notification::new(method, payload).into()).await
    }

    fn reset_deadline(&self) {
        let next = Instant::now() + self.idle_timeout;
        self.deadline.super_safe_lock(|deadline| *deadline = next);
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.to_string()
    }
}

/// Stratum TCP listener.
pub struct Downstream {
    server: Arc<StratumServer>,
    listener: TcpListener,
    connection_timeout: Duration,
    write_timeout: Duration,
    next_session_id: u64,
}

impl Downstream {
    pub async fn bind(server: Arc<StratumServer>, config: &PoolConfig) -> PoolResult<Self> {
        let listener = TcpListener::bind(&config.listen_address).await?;
        info!("Stratum listening on {}", listener.local_addr()?);
        Ok(Self {
            server,
            listener,
            connection_timeout: Duration::from_secs(config.stratum.connection_timeout_secs),
            write_timeout: Duration::from_millis(config.stratum.write_timeout_ms),
            next_session_id: 0,
        })
    }

    pub fn local_addr(&self) -> PoolResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever. Accept errors are logged and retried after a backoff.
    pub async fn accept_connections(mut self, status_tx: status::Sender) {
        let mut failures = 0u32;
        loop {
            match self.listener.accept().await {
                Ok((stream, remote_addr)) => {
                    failures = 0;
                    self.next_session_id += 1;
                    debug!("New connection {} from {}", self.next_session_id, remote_addr);
                    tokio::spawn(handle_connection(
                        self.server.clone(),
                        stream,
                        remote_addr,
                        self.next_session_id,
                        self.connection_timeout,
                        self.write_timeout,
                    ));
                }
                Err(e) => {
                    error!("Failed to accept connection: {e}");
                    if status_tx.is_closed() {
                        break;
                    }
                    failures = failures.saturating_add(1);
                    tokio::time::sleep(accept_backoff(failures)).await;
                }
            }
        }
    }
}

/// Serves one miner until it disconnects or stays idle past its deadline.
async fn handle_connection(
    server: Arc<StratumServer>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    session_id: u64,
    connection_timeout: Duration,
    write_timeout: Duration,
) {
    let connection = StratumConnection::new(stream);
    let transport = Arc::new(TcpTransport::new(
        connection.sender(),
        remote_addr,
        write_timeout,
        connection_timeout,
    ));
    let session = Arc::new(Session::new(
        session_id,
        remote_addr.ip().to_string(),
        server.job_backlog(),
        transport.clone(),
    ));
    let mut handler = SessionHandler::new(server.clone(), session);

    loop {
        let received = tokio::time::timeout_at(transport.deadline(), connection.receive()).await;
        let msg = match received {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                debug!("Connection from {} closed", remote_addr);
                break;
            }
            // A job delivery may have moved the deadline while we were waiting.
            Err(_) if transport.deadline() > Instant::now() => continue,
            Err(_) => {
                info!("Connection from {} timed out", remote_addr);
                break;
            }
        };
        transport.reset_deadline();
        match handler.handle_message(msg) {
            Ok(Some(response)) => {
                if let Err(e) = transport.send(response.into()).await {
                    warn!("Failed to answer {}: {}", remote_addr, e);
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Unexpected message from {}: {}", remote_addr, e),
        }
    }

    server.sessions().remove(session_id);
    connection.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncBufReadExt;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[test]
    fn accept_backoff_grows_and_is_capped() {
        assert_eq!(accept_backoff(1), Duration::from_millis(50));
        assert_eq!(accept_backoff(2), Duration::from_millis(100));
        assert_eq!(accept_backoff(5), Duration::from_millis(800));
        assert_eq!(accept_backoff(6), ACCEPT_BACKOFF_MAX);
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
    }

    #[tokio::test]
    async fn connection_reads_and_writes_lines() {
        let (client, server) = pair().await;
        let connection = StratumConnection::new(server);
        let (read_half, mut write_half) = client.into_split();

        write_half
            .write_all(b"{\"id\":1,\"method\":\"getjob\",\"params\":{\"id\":\"Addr1\"}}\n\n")
            .await
            .unwrap();
        match connection.receive().await.unwrap() {
            Message::StandardRequest(request) => {
                assert_eq!(request.id, json!(1));
                assert_eq!(request.method, "getjob");
            }
            other => panic!("Unexpected message {other:?}"),
        }

        let transport = TcpTransport::new(
            connection.sender(),
            "127.0.0.1:1".parse().unwrap(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        transport
            .push_message("job", json!({"job_id": "1"}))
            .await
            .unwrap();
        let mut lines = tokio::io::BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let pushed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(pushed["method"], json!("job"));
        assert_eq!(pushed["jsonrpc"], json!("2.0"));
        assert_eq!(pushed["params"]["job_id"], json!("1"));
    }

    #[tokio::test]
    async fn push_on_closed_connection_fails() {
        let (sender, receiver) = bounded(1);
        drop(receiver);
        let transport = TcpTransport::new(
            sender,
            "127.0.0.1:1".parse().unwrap(),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        assert!(matches!(
            transport.push_message("job", json!({})).await,
            Err(PoolError::TransportClosed(_))
        ));
    }

    #[tokio::test]
    async fn push_on_full_queue_times_out() {
        let (sender, _receiver) = bounded(1);
        let transport = TcpTransport::new(
            sender,
            "127.0.0.1:1".parse().unwrap(),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        transport.push_message("job", json!({})).await.unwrap();
        assert!(matches!(
            transport.push_message("job", json!({})).await,
            Err(PoolError::TransportTimeout(_))
        ));
    }

    #[tokio::test]
    async fn reset_moves_deadline_forward() {
        let (sender, _receiver) = bounded(1);
        let transport = TcpTransport::new(
            sender,
            "127.0.0.1:1".parse().unwrap(),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        let before = transport.deadline();
        tokio::time::sleep(Duration::from_millis(5)).await;
        transport.reset_deadline();
        assert!(transport.deadline() > before);
    }
}
