use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use rcon_proto::{Packet, PacketType, ProtocolError, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Ids of one command exchange: the command itself and the empty
/// follow-up whose echo marks the end of the response.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Exchange {
    pub cmd_id: i32,
    pub sentinel_id: i32,
}

/// Sends `command` and reassembles its (possibly fragmented) response.
///
/// The whole response must arrive within `Timeouts::response`, counted from
/// the moment the sentinel is sent; stray packets do not extend it. On any
/// timeout the error carries whatever body had arrived.
pub(crate) async fn execute<S>(
    transport: &mut Transport<S>,
    exchange: Exchange,
    command: &str,
) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Build both packets up front so an unencodable command never touches the socket
    let request = Packet::new(
        exchange.cmd_id,
        PacketType::ExecCommand,
        Bytes::copy_from_slice(command.as_bytes()),
    )?;
    let sentinel = Packet::empty(exchange.sentinel_id, PacketType::ExecCommand);

    transport.send_packet(&request).await?;
    transport.send_packet(&sentinel).await?;
    debug!(
        "Sent command (id: {}) and sentinel (id: {})",
        exchange.cmd_id, exchange.sentinel_id
    );

    collect_response(transport, exchange).await
}

async fn collect_response<S>(transport: &mut Transport<S>, exchange: Exchange) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response_timeout = transport.timeouts().response;
    let deadline = Instant::now() + response_timeout;
    let mut body = BytesMut::new();
    let mut fragments = 0usize;

    loop {
        let packet = match timeout_at(deadline, transport.receive_packet()).await {
            Ok(Ok(packet)) => packet,
            Ok(Err(ProtocolError::Timeout {
                operation, after, ..
            })) => {
                return Err(ProtocolError::Timeout {
                    operation,
                    after,
                    partial: body.to_vec(),
                })
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ProtocolError::Timeout {
                    operation: "response",
                    after: response_timeout,
                    partial: body.to_vec(),
                })
            }
        };

        if packet.id() == exchange.cmd_id {
            fragments += 1;
            body.extend_from_slice(packet.body());
            continue;
        }

        if packet.id() == exchange.sentinel_id {
            if !packet.body().is_empty() {
                debug!("Sentinel reply carried {} unexpected body bytes", packet.body().len());
            }
            debug!(
                "Response complete: {} bytes in {} packet(s)",
                body.len(),
                fragments
            );
            return Ok(body.freeze());
        }

        debug!(
            "Discarding stray packet id={} type={} ({} body bytes)",
            packet.id(),
            packet.kind(),
            packet.body().len()
        );
    }
}
