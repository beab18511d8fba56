use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use raven_common::time::UnixTimestamp;
use raven_common::{Auth, Dsn};

use crate::{Payload, Transport, TransportError};

/// Sends each payload as a single datagram of `"<auth header>\n\n<payload>"`.
///
/// There is no acknowledgment. Only local socket errors are reported.
#[derive(Debug)]
pub struct UdpTransport {
    dsn: Dsn,
    port: u16,
}

impl UdpTransport {
    /// Creates a transport for a DSN with an explicit port.
    pub fn new(dsn: Dsn) -> Result<Self, TransportError> {
        let port = dsn
            .port()
            .ok_or_else(|| TransportError::Config("udp dsn requires a port".to_owned()))?;

        Ok(Self { dsn, port })
    }

    fn resolve(&self) -> Result<SocketAddr, TransportError> {
        (self.dsn.host(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                TransportError::Config(format!("could not resolve {}", self.dsn.host()))
            })
    }
}

impl Transport for UdpTransport {
    fn send_data(&self, payload: Payload) -> Result<(), TransportError> {
        let addr = self.resolve()?;
        let bind_addr: SocketAddr = match addr {
            SocketAddr::V4(_) => ([0u8; 4], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };

        let auth = Auth::from_dsn(&self.dsn, raven_common::user_agent(), UnixTimestamp::now());
        let mut datagram = format!("{auth}\n\n").into_bytes();
        datagram.extend_from_slice(&payload.data);

        let socket = UdpSocket::bind(bind_addr)?;
        socket.send_to(&datagram, addr)?;
        Ok(())
    }
}
