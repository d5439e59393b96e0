use bytes::BytesMut;
use rcon_proto::{
    framing, Packet, ProtocolError, Result, DEFAULT_MAX_PACKET_SIZE, SIZE_FIELD_LEN,
};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Deadlines applied to each individual socket operation, plus one
/// overall deadline for collecting a whole command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
    pub response: Duration,
}

impl Timeouts {
    pub fn uniform(duration: Duration) -> Self {
        Self {
            connect: duration,
            read: duration,
            write: duration,
            response: duration,
        }
    }
}

/// Owns the byte stream to the server and moves whole packets across it.
///
/// TCP carries no message boundaries, so every read goes through
/// [`Transport::receive_exactly`].
#[derive(Debug)]
pub struct Transport<S = TcpStream> {
    stream: Option<S>,
    peer: String,
    timeouts: Timeouts,
    max_packet_size: u32,
}

impl Transport<TcpStream> {
    /// Opens a TCP connection within `timeouts.connect`.
    pub async fn connect(host: &str, port: u16, timeouts: Timeouts) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        debug!("Connecting to {} (timeout: {:?})", addr, timeouts.connect);

        let stream = match timeout(timeouts.connect, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ProtocolError::Connect { addr, source }),
            Err(_) => {
                return Err(ProtocolError::Connect {
                    addr,
                    source: std::io::Error::new(ErrorKind::TimedOut, "connect timeout"),
                })
            }
        };

        // Packets are small and strictly request/response
        stream.set_nodelay(true)?;

        Ok(Self::from_stream(stream, addr, timeouts))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn from_stream(stream: S, peer: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            stream: Some(stream),
            peer: peer.into(),
            timeouts,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(mut self, max_packet_size: u32) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> Result<&mut S> {
        self.stream.as_mut().ok_or(ProtocolError::ConnectionClosed)
    }

    /// Writes the whole encoded packet, however many writes that takes.
    pub async fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let mut buf = BytesMut::new();
        packet.encode_into(&mut buf);

        debug!(
            "Sending packet id={} type={} ({} bytes) to {}",
            packet.id(),
            packet.kind(),
            buf.len(),
            self.peer
        );

        let write_timeout = self.timeouts.write;
        let stream = self.stream()?;
        let write = async {
            stream.write_all(&buf).await?;
            stream.flush().await
        };

        match timeout(write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(map_io_error(e)),
            Err(_) => Err(ProtocolError::Timeout {
                operation: "write",
                after: write_timeout,
                partial: Vec::new(),
            }),
        }
    }

    /// Reads exactly `n` bytes or fails with a timeout or closed connection.
    pub async fn receive_exactly(&mut self, n: usize) -> Result<BytesMut> {
        let read_timeout = self.timeouts.read;
        let stream = self.stream()?;
        let mut buf = BytesMut::zeroed(n);

        match timeout(read_timeout, stream.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Ok(buf),
            Ok(Err(e)) => Err(map_io_error(e)),
            Err(_) => Err(ProtocolError::Timeout {
                operation: "read",
                after: read_timeout,
                partial: Vec::new(),
            }),
        }
    }

    /// Reads one complete packet: the size prefix, then exactly that many bytes.
    pub async fn receive_packet(&mut self) -> Result<Packet> {
        let header = self.receive_exactly(SIZE_FIELD_LEN).await?;
        let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        framing::validate_size(size, self.max_packet_size)?;

        let payload = self.receive_exactly(size as usize).await?;
        let packet = Packet::decode_payload(&payload)?;

        debug!(
            "Received packet id={} type={} ({} body bytes) from {}",
            packet.id(),
            packet.kind(),
            packet.body().len(),
            self.peer
        );

        Ok(packet)
    }

    /// Shuts the stream down and releases it. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Shutdown of {} failed: {}", self.peer, e);
            }
            debug!("Closed connection to {}", self.peer);
        }
    }
}

fn map_io_error(e: std::io::Error) -> ProtocolError {
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => ProtocolError::ConnectionClosed,
        _ => ProtocolError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcon_proto::PacketType;
    use std::time::Instant;

    fn timeouts(ms: u64) -> Timeouts {
        Timeouts::uniform(Duration::from_millis(ms))
    }

    #[tokio::test]
    async fn test_receive_exactly_across_partial_writes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(client, "duplex", timeouts(1000));

        tokio::spawn(async move {
            server.write_all(b"hel").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"lo world").await.unwrap();
        });

        let first = transport.receive_exactly(5).await.unwrap();
        assert_eq!(first.as_ref(), b"hello");

        let rest = transport.receive_exactly(6).await.unwrap();
        assert_eq!(rest.as_ref(), b" world");
    }

    #[tokio::test]
    async fn test_receive_packet_split_across_reads() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(client, "duplex", timeouts(1000));

        let bytes = Packet::new(4, PacketType::ResponseValue, "split body")
            .unwrap()
            .to_bytes();

        tokio::spawn(async move {
            for chunk in bytes.chunks(3) {
                server.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let packet = transport.receive_packet().await.unwrap();
        assert_eq!(packet.id(), 4);
        assert_eq!(packet.body().as_ref(), b"split body");
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(client, "duplex", timeouts(1000));

        server.write_all(&[20, 0]).await.unwrap();
        drop(server);

        let result = transport.receive_packet().await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(client, "duplex", timeouts(100));

        let started = Instant::now();
        let result = transport.receive_exactly(4).await;

        assert!(matches!(
            result,
            Err(ProtocolError::Timeout { operation: "read", .. })
        ));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_oversized_declared_size_rejected() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport =
            Transport::from_stream(client, "duplex", timeouts(1000)).with_max_packet_size(32);

        server.write_all(&64u32.to_le_bytes()).await.unwrap();

        let result = transport.receive_packet().await;
        assert!(matches!(result, Err(ProtocolError::Decoding(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(client, "duplex", timeouts(1000));

        transport.close().await;
        transport.close().await;

        assert!(!transport.is_open());
        let result = transport.send_packet(&Packet::empty(1, PacketType::ExecCommand)).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to find a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Transport::connect("127.0.0.1", port, timeouts(1000)).await;
        assert!(matches!(result, Err(ProtocolError::Connect { .. })));
    }
}
