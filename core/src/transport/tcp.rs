// TCP modem transport — VaraHF and soft-TNC KISS ports
//
// Connects lazily on first use and drops the socket on any hard error so
// the next call reconnects.

use super::io::read_some;
use super::{ByteTransport, TransportError, TransportType};
use crate::config::ModemConfig;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};

pub struct TcpModem {
    config: ModemConfig,
    stream: Option<TcpStream>,
}

impl TcpModem {
    pub fn new(config: ModemConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the socket now instead of on first send/receive
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.stream()?;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Disconnected from modem {}:{}", self.config.host, self.config.port);
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        if self.stream.is_none() {
            let stream = self.open()?;
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionFailed("not connected".to_string()))
    }

    fn open(&self) -> Result<TcpStream, TransportError> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let timeout = self.config.timeout();
        let addrs = target
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", target, e)))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    tracing::info!("Connected to modem at {}", addr);
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        let reason = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no addresses resolved".to_string());
        tracing::warn!("Modem connection to {} failed: {}", target, reason);
        Err(TransportError::ConnectionFailed(format!("{}: {}", target, reason)))
    }
}

impl ByteTransport for TcpModem {
    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let result = {
            let stream = self.stream()?;
            stream.write_all(data).and_then(|_| stream.flush())
        };
        result.map_err(|e| {
            self.disconnect();
            TransportError::from(e)
        })
    }

    fn receive(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let result = read_some(self.stream()?, max);
        if result.is_err() {
            self.disconnect();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    fn modem_for(listener: &TcpListener) -> TcpModem {
        let port = listener.local_addr().unwrap().port();
        TcpModem::new(ModemConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_ms: 200,
        })
    }

    #[test]
    fn test_send_and_receive_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut modem = modem_for(&listener);

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).unwrap();
            sock.write_all(b"pong").unwrap();
            buf
        });

        assert!(!modem.is_connected());
        modem.send(b"ping!").unwrap();
        assert!(modem.is_connected());

        let mut got = Vec::new();
        while got.len() < 4 {
            got.extend(modem.receive(64).unwrap());
        }
        assert_eq!(got, b"pong");
        assert_eq!(&server.join().unwrap(), b"ping!");
    }

    #[test]
    fn test_read_timeout_is_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut modem = modem_for(&listener);
        modem.connect().unwrap();
        let (_sock, _) = listener.accept().unwrap();

        assert!(modem.receive(64).unwrap().is_empty());
        assert!(modem.is_connected());
    }

    #[test]
    fn test_peer_close_disconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut modem = modem_for(&listener);
        modem.connect().unwrap();
        let (sock, _) = listener.accept().unwrap();
        drop(sock);

        assert_eq!(modem.receive(64), Err(TransportError::Closed));
        assert!(!modem.is_connected());
    }

    #[test]
    fn test_connection_refused() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let mut modem = TcpModem::new(ModemConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_ms: 200,
        });
        assert!(matches!(
            modem.send(b"x"),
            Err(TransportError::ConnectionFailed(_))
        ));
    }
}
