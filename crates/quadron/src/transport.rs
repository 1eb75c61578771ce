//! Datagram transport.
//!
//! Thin wrapper around a bound UDP socket. Sends are fire-and-forget: the
//! protocol tolerates datagram loss through the next periodic cycle, so a
//! failed send is logged and forgotten. Receives block for at most a short
//! poll interval so the receive loop can observe shutdown.

use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use crate::identifier::Identifier;
use crate::protocol::{MAX_PACKET_LEN, Packet};

/// How long a blocking receive waits before giving the caller a chance to
/// re-check its running flag.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// UDP endpoint bound to the local peer's address.
pub struct Endpoint {
    socket: UdpSocket,
    local: Identifier,
}

impl Endpoint {
    /// Binds `identifier`. Port 0 selects an ephemeral port; the returned
    /// endpoint reports the actually bound one.
    pub fn bind(identifier: Identifier) -> io::Result<Self> {
        let socket = UdpSocket::bind(identifier.socket_addr())?;
        socket.set_read_timeout(Some(RECV_POLL_INTERVAL))?;

        let local = Identifier::new(identifier.addr(), socket.local_addr()?.port());

        Ok(Self { socket, local })
    }

    pub fn local_identifier(&self) -> Identifier {
        self.local
    }

    /// Sends `packet` to `to`. Failures are logged and otherwise ignored.
    pub fn send(&self, packet: &Packet, to: Identifier) {
        let data = packet.encode();
        if let Err(e) = self.socket.send_to(&data, to.socket_addr()) {
            log::warn!("{}: failed to send {:?} to {}: {}", self.local, packet, to, e);
        }
    }

    /// Receives and decodes the next datagram.
    ///
    /// Returns `Ok(None)` when the poll interval elapsed without traffic or
    /// the datagram had no usable IPv4 origin.
    pub fn recv(&self) -> io::Result<Option<(Packet, Identifier)>> {
        let mut buf = [0u8; MAX_PACKET_LEN];

        match self.socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                let Some(origin) = Identifier::from_socket_addr(addr) else {
                    log::debug!("{}: dropping datagram from non-IPv4 origin {}", self.local, addr);
                    return Ok(None);
                };
                Ok(Some((Packet::decode(&buf[..len]), origin)))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Instant;

    use glam::I64Vec2;

    use super::*;

    fn loopback() -> Identifier {
        Identifier::new(Ipv4Addr::LOCALHOST, 0)
    }

    fn recv_blocking(endpoint: &Endpoint) -> (Packet, Identifier) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(received) = endpoint.recv().unwrap() {
                return received;
            }
        }
        panic!("no datagram received");
    }

    #[test]
    fn bind_reports_ephemeral_port() {
        let endpoint = Endpoint::bind(loopback()).unwrap();
        assert_ne!(endpoint.local_identifier().port(), 0);
    }

    #[test]
    fn packets_survive_the_loopback_roundtrip() {
        let sender = Endpoint::bind(loopback()).unwrap();
        let receiver = Endpoint::bind(loopback()).unwrap();

        let packet = Packet::Move {
            position: I64Vec2::new(400, 300),
            aoi_radius: 100,
        };
        sender.send(&packet, receiver.local_identifier());

        let (received, origin) = recv_blocking(&receiver);
        assert_eq!(received, packet);
        assert_eq!(origin, sender.local_identifier());
    }

    #[test]
    fn garbage_datagrams_decode_to_invalid() {
        let sender = Endpoint::bind(loopback()).unwrap();
        let receiver = Endpoint::bind(loopback()).unwrap();

        sender
            .socket
            .send_to(&[0xAB, 0xCD], receiver.local_identifier().socket_addr())
            .unwrap();

        let (received, _) = recv_blocking(&receiver);
        assert_eq!(received, Packet::Invalid);
    }
}
