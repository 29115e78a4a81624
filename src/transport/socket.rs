//! Raw SCPI over TCP.
//!
//! Most LAN instruments accept SCPI on port 5025 without a VISA runtime.
//! Replies are read up to the terminator byte; a definite-length block is
//! read to its announced length first, since its payload may contain the
//! terminator.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Scratch buffer size used while discarding input
const DISCARD_CHUNK: usize = 4096;

use super::{Transport, TransportSettings};
use crate::error::{DriverError, DriverResult};
use crate::scpi::block::{self, Completion};

/// TCP link to one instrument
pub struct SocketTransport {
    resource: String,
    stream: Option<BufReader<TcpStream>>,
    read_terminator: u8,
}

impl SocketTransport {
    /// Connect to `target` (`host:port`), bounded by the settings' timeout.
    ///
    /// # Errors
    /// `Connection` if the connect fails or does not finish in time.
    pub async fn connect(target: &str, settings: TransportSettings) -> DriverResult<Self> {
        let stream = tokio::time::timeout(settings.timeout, TcpStream::connect(target))
            .await
            .map_err(|_| {
                DriverError::connection(
                    target,
                    format!("connect timed out after {:?}", settings.timeout),
                )
            })?
            .map_err(|e| DriverError::connection(target, e))?;

        stream
            .set_nodelay(true)
            .map_err(|e| DriverError::connection(target, e))?;
        debug!(target = %target, "TCP stream established");

        Ok(Self {
            resource: target.to_string(),
            stream: Some(BufReader::new(stream)),
            read_terminator: settings.read_terminator,
        })
    }

    fn closed_error(resource: &str) -> DriverError {
        DriverError::communication(resource, "connection closed by instrument")
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn write(&mut self, data: &[u8]) -> DriverResult<()> {
        let resource = &self.resource;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DriverError::NotConnected(resource.clone()))?;

        let socket = stream.get_mut();
        socket
            .write_all(data)
            .await
            .map_err(|e| DriverError::communication(resource, e))?;
        socket
            .flush()
            .await
            .map_err(|e| DriverError::communication(resource, e))?;
        trace!(bytes = data.len(), "socket write");
        Ok(())
    }

    async fn read_message(&mut self) -> DriverResult<Vec<u8>> {
        let terminator = self.read_terminator;
        let resource = &self.resource;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DriverError::NotConnected(resource.clone()))?;

        let mut message = Vec::new();
        let n = stream
            .read_until(terminator, &mut message)
            .await
            .map_err(|e| DriverError::communication(resource, e))?;
        if n == 0 {
            return Err(Self::closed_error(resource));
        }

        loop {
            match block::completion(&message, terminator) {
                Completion::Complete => break,
                Completion::NeedBytes(missing) => {
                    let start = message.len();
                    message.resize(start + missing, 0);
                    stream
                        .read_exact(&mut message[start..])
                        .await
                        .map_err(|e| DriverError::communication(resource, e))?;
                }
                Completion::NeedTerminator => {
                    let n = stream
                        .read_until(terminator, &mut message)
                        .await
                        .map_err(|e| DriverError::communication(resource, e))?;
                    if n == 0 {
                        // Peer closed right after the payload
                        break;
                    }
                }
            }
        }

        trace!(bytes = message.len(), "socket read");
        Ok(message)
    }

    async fn clear(&mut self, quiet: Duration) -> DriverResult<usize> {
        let resource = &self.resource;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DriverError::NotConnected(resource.clone()))?;

        // Reading through the BufReader also empties its internal buffer
        let mut scratch = [0u8; DISCARD_CHUNK];
        let mut discarded = 0;
        loop {
            match tokio::time::timeout(quiet, stream.read(&mut scratch)).await {
                Err(_) => break,
                Ok(Ok(0)) => return Err(Self::closed_error(resource)),
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(DriverError::communication(resource, e)),
            }
        }
        trace!(bytes = discarded, "socket input discarded");
        Ok(discarded)
    }

    async fn close(&mut self) -> DriverResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream
                .get_mut()
                .shutdown()
                .await
                .map_err(|e| DriverError::communication(&self.resource, e))?;
            debug!(target = %self.resource, "TCP stream closed");
        }
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn settings() -> TransportSettings {
        TransportSettings {
            timeout: Duration::from_secs(2),
            read_terminator: b'\n',
            socket_port: 5025,
        }
    }

    #[tokio::test]
    async fn test_query_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut line = String::new();
            socket.read_line(&mut line).await.unwrap();
            assert_eq!(line, "*IDN?\n");
            socket
                .get_mut()
                .write_all(b"AnaPico,APSIN20G,1156,0.4.106\n")
                .await
                .unwrap();
        });

        let mut transport = SocketTransport::connect(&addr.to_string(), settings())
            .await
            .unwrap();
        transport.write(b"*IDN?\n").await.unwrap();
        let reply = transport.read_message().await.unwrap();
        assert_eq!(reply, b"AnaPico,APSIN20G,1156,0.4.106\n");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_block_with_embedded_terminator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // 0x0A inside the payload must not end the read
            socket.write_all(b"#14\x01\x0A\x02\x03\n").await.unwrap();
        });

        let mut transport = SocketTransport::connect(&addr.to_string(), settings())
            .await
            .unwrap();
        let reply = transport.read_message().await.unwrap();
        assert_eq!(reply, b"#14\x01\x0A\x02\x03\n");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_discards_late_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            let mut line = String::new();
            socket.read_line(&mut line).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            socket.get_mut().write_all(b"late,reply\n").await.unwrap();

            line.clear();
            socket.read_line(&mut line).await.unwrap();
            assert_eq!(line, "FREQ?\n");
            socket.get_mut().write_all(b"1.0E+09\n").await.unwrap();
        });

        let mut transport = SocketTransport::connect(&addr.to_string(), settings())
            .await
            .unwrap();
        transport.write(b"*IDN?\n").await.unwrap();
        let discarded = transport.clear(Duration::from_millis(300)).await.unwrap();
        assert_eq!(discarded, b"late,reply\n".len());

        transport.write(b"FREQ?\n").await.unwrap();
        assert_eq!(transport.read_message().await.unwrap(), b"1.0E+09\n");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_transport_reports_not_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let mut transport = SocketTransport::connect(&addr.to_string(), settings())
            .await
            .unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(matches!(
            transport.write(b"*RST\n").await,
            Err(DriverError::NotConnected(_))
        ));
        accept.await.unwrap().unwrap();
    }
}
