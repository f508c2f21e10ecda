use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::codec::PacketCodec;
use crate::error::RespotError;
use crate::message::PacketType;
use crate::network::Transport;
use crate::packet::Packet;
use crate::player::Player;

const QUEUE_DEPTH: usize = 100;

/// A framed connection to one access point.
///
/// Outbound packets go through a queue drained by a writer task, so any
/// number of callers may send without coordinating. Inbound packets are
/// read by a reader task and handed over in arrival order.
#[derive(Debug)]
pub struct Connection {
    tx: mpsc::Sender<Packet>,
    rx: mpsc::Receiver<Packet>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        let (mut net_writer, mut net_reader) = Framed::new(stream, PacketCodec).split();

        // User -> Network
        let (user_tx, mut network_rx) = mpsc::channel::<Packet>(QUEUE_DEPTH);

        // Network -> User
        let (network_tx, user_rx) = mpsc::channel(QUEUE_DEPTH);

        tokio::spawn(async move {
            while let Some(packet) = network_rx.recv().await {
                if let Err(e) = net_writer.send(packet).await {
                    warn!(?peer, "network write error: {e}");
                    break;
                }
            }
            debug!(?peer, "writer task finished");
        });

        tokio::spawn(async move {
            loop {
                // Stop as soon as the receiving half is dropped so the
                // socket closes even while the peer is silent.
                let result = tokio::select! {
                    _ = network_tx.closed() => break,
                    next = net_reader.next() => match next {
                        Some(result) => result,
                        None => break,
                    },
                };
                match result {
                    Ok(packet) => {
                        if network_tx.send(packet).await.is_err() {
                            // Receiving half dropped, stop reading.
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(?peer, "network read error: {e}");
                        break;
                    }
                }
            }
            debug!(?peer, "reader task finished");
        });

        Self {
            tx: user_tx,
            rx: user_rx,
        }
    }

    pub async fn connect(info: &ConnectionInfo) -> Result<Self, RespotError> {
        let stream = TcpStream::connect(info.to_string()).await?;
        stream.set_nodelay(true)?;
        info!(%info, "connected to access point");
        Ok(Self::new(stream))
    }

    /// A cloneable handle for sending on this connection.
    pub fn sender(&self) -> ConnectionSender {
        ConnectionSender {
            tx: self.tx.clone(),
        }
    }

    pub async fn send(&self, packet: Packet) -> Result<(), RespotError> {
        self.tx.send(packet).await.map_err(RespotError::from)
    }

    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Feed every inbound packet to `player.dispatch` in arrival order.
    ///
    /// Pings are answered here. When the stream ends the player is closed,
    /// failing whatever was still waiting.
    pub fn spawn_dispatcher(mut self, player: Player) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(packet) = self.rx.recv().await {
                let (cmd, payload) = packet.into_parts();
                trace!(cmd, len = payload.len(), "inbound packet");
                if cmd == PacketType::Ping as u8 {
                    answer_ping(&self.tx);
                    continue;
                }
                player.dispatch(cmd, payload);
            }
            info!("connection closed");
            player.close();
        })
    }
}

/// Queue a pong without waiting. The dispatch loop must never block on the
/// writer, so a full queue drops the pong.
fn answer_ping(tx: &mpsc::Sender<Packet>) -> bool {
    let pong = match Packet::new(PacketType::Pong, Bytes::from_static(&[0u8; 4])) {
        Ok(p) => p,
        Err(e) => {
            warn!("cannot build pong: {e}");
            return false;
        }
    };
    match tx.try_send(pong) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("writer queue full, pong dropped");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("pong dropped, writer gone");
            false
        }
    }
}

/// Sending half of a [`Connection`], usable as the player's [`Transport`].
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    tx: mpsc::Sender<Packet>,
}

#[async_trait]
impl Transport for ConnectionSender {
    async fn send_packet(&self, packet_type: PacketType, payload: Bytes) -> Result<(), RespotError> {
        let packet = Packet::new(packet_type, payload)?;
        self.tx.send(packet).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
