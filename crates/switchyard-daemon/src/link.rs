//! Remote console link over IPv4 multicast

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use switchyard_engine::{ActivityNotifier, RemoteMessage};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Multicast group shared by every peer
pub const REMOTE_GROUP: Ipv4Addr = Ipv4Addr::new(239, 14, 10, 30);

/// Multicast port shared by every peer
pub const REMOTE_PORT: u16 = 12814;

const MAX_DATAGRAM: usize = 2048;

/// Outbound half: sends console lines to the group
pub struct RemoteSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl RemoteSender {
    pub async fn bind() -> std::io::Result<Self> {
        Self::bind_to(SocketAddrV4::new(REMOTE_GROUP, REMOTE_PORT).into()).await
    }

    /// Bind an ephemeral socket sending to `target`
    pub async fn bind_to(target: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_multicast_ttl_v4(1)?;
        Ok(Self { socket, target })
    }

    pub async fn send(&self, message: &RemoteMessage) -> std::io::Result<()> {
        self.socket.send_to(&message.encode(), self.target).await?;
        Ok(())
    }
}

/// Inbound half: forwards console lines from peers to the notifier
pub struct RemoteReceiver {
    socket: UdpSocket,
}

impl RemoteReceiver {
    /// Bind the shared port and join the group
    pub async fn join() -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, REMOTE_PORT)).await?;
        socket.join_multicast_v4(REMOTE_GROUP, Ipv4Addr::UNSPECIFIED)?;
        info!(group = %REMOTE_GROUP, port = REMOTE_PORT, "Joined remote console group");
        Ok(Self { socket })
    }

    /// Wrap an already bound socket
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub async fn run(self, notifier: ActivityNotifier, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => match RemoteMessage::decode(&buf[..len]) {
                        Some(RemoteMessage::Console(body)) => notifier.remote(from.ip(), body),
                        None => debug!(%from, len, "Ignoring unknown remote message"),
                    },
                    Err(e) => warn!("Remote receive failed: {}", e),
                },
                _ = shutdown.changed() => {
                    debug!("Remote receiver stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_engine::Notification;

    #[tokio::test]
    async fn test_console_line_reaches_notifier() {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let receiver = RemoteReceiver::from_socket(socket);

        let (notifier, mut rx) = ActivityNotifier::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(receiver.run(notifier, shutdown_rx));

        let sender = RemoteSender::bind_to(addr).await.unwrap();
        sender.socket.send_to(b"XYZ ignored", addr).await.unwrap();
        sender
            .send(&RemoteMessage::Console("12:00:00 Starting X11".to_string()))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Notification::Remote { from, body } => {
                assert_eq!(from, std::net::IpAddr::V4(Ipv4Addr::LOCALHOST));
                assert_eq!(body, "12:00:00 Starting X11");
            }
            other => panic!("unexpected notification {:?}", other),
        }

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
