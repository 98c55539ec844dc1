//! UDP Transport
//!
//! One socket per node, bound to the node's own address so the source of every
//! outgoing datagram matches its identity. Receiving and sending each run on
//! a background task; the engine only ever touches channels.
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{FrozenTransportStats, InboundDatagram, InboxSender, Transport, TransportStats};
use crate::error::Result;
use crate::node::NodeIdentity;
use crate::protocol::MAX_MESSAGE_LEN;
use crate::transport_error;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = MAX_MESSAGE_LEN;

#[derive(Debug)]
pub struct UdpTransport {
    local_identity: NodeIdentity,
    outbound: mpsc::UnboundedSender<(SocketAddr, Bytes)>,
    stats: Arc<TransportStats>,
}

impl UdpTransport {
    /// Bind the socket and start feeding `inbox`
    pub async fn bind(bind_addr: SocketAddr, inbox: InboxSender) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| transport_error!("Socket bind failed on {}: {}", bind_addr, e))?;
        let local_identity = NodeIdentity::try_from(socket.local_addr()?)?;
        let socket = Arc::new(socket);
        let stats = Arc::new(TransportStats::default());

        Self::spawn_receiver(Arc::clone(&socket), inbox, Arc::clone(&stats), local_identity);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Self::spawn_sender(socket, outbound_rx, Arc::clone(&stats), local_identity);

        debug!("[{}] UDP transport listening", local_identity);
        Ok(Self {
            local_identity,
            outbound,
            stats,
        })
    }

    /// Identity derived from the bound socket address
    pub fn local_identity(&self) -> NodeIdentity {
        self.local_identity
    }

    pub fn stats(&self) -> FrozenTransportStats {
        self.stats.freeze()
    }

    fn spawn_receiver(
        socket: Arc<UdpSocket>,
        inbox: InboxSender,
        stats: Arc<TransportStats>,
        local_identity: NodeIdentity,
    ) {
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
            loop {
                tokio::select! {
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, source)) => {
                            stats.messages_received.fetch_add(1, Ordering::Relaxed);
                            let data = Bytes::copy_from_slice(&buf[..len]);
                            if !inbox.deliver(InboundDatagram::new(data, Some(source))) {
                                break;
                            }
                        }
                        Err(e) => {
                            stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                            warn!("[{}] UDP receive error: {}", local_identity, e);
                        }
                    },
                    _ = inbox.closed() => break,
                }
            }
            debug!("[{}] UDP receiver stopped", local_identity);
        });
    }

    fn spawn_sender(
        socket: Arc<UdpSocket>,
        mut outbound: mpsc::UnboundedReceiver<(SocketAddr, Bytes)>,
        stats: Arc<TransportStats>,
        local_identity: NodeIdentity,
    ) {
        tokio::spawn(async move {
            while let Some((target, data)) = outbound.recv().await {
                match socket.send_to(&data, target).await {
                    Ok(_) => {
                        stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        stats.send_errors.fetch_add(1, Ordering::Relaxed);
                        error!("[{}] Failed to send to {}: {}", local_identity, target, e);
                    }
                }
            }
        });
    }
}

impl Transport for UdpTransport {
    fn send(&self, _src: NodeIdentity, dst: NodeIdentity, data: Bytes) {
        if data.len() > MAX_DATAGRAM_SIZE {
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                "[{}] Dropping {} byte message to {}: exceeds datagram limit",
                self.local_identity,
                data.len(),
                dst
            );
            return;
        }
        if self.outbound.send((dst.socket_addr(), data)).is_err() {
            self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}
