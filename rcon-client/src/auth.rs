use crate::transport::Transport;
use bytes::Bytes;
use rcon_proto::{Packet, PacketType, Phase, ProtocolError, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Id a server puts on its auth reply when the password is wrong.
pub(crate) const AUTH_REJECTED_ID: i32 = -1;

/// Proves knowledge of the server password.
pub(crate) async fn authenticate<S>(
    transport: &mut Transport<S>,
    auth_id: i32,
    password: &str,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = Packet::new(auth_id, PacketType::Auth, Bytes::copy_from_slice(password.as_bytes()))?;
    transport.send_packet(&request).await?;
    debug!("Sent AUTH (id: {})", auth_id);

    let first = transport.receive_packet().await?;
    let reply = skip_leading_noise(transport, first).await?;

    check_auth_reply(&reply, auth_id)
}

/// Some servers emit an empty RESPONSE_VALUE right before the auth reply.
/// At most one such packet is skipped.
async fn skip_leading_noise<S>(transport: &mut Transport<S>, first: Packet) -> Result<Packet>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let is_noise = first.packet_type(Phase::Authenticating) == Some(PacketType::ResponseValue)
        && first.body().is_empty();

    if !is_noise {
        return Ok(first);
    }

    debug!("Skipping empty RESPONSE_VALUE (id: {}) ahead of auth reply", first.id());
    transport.receive_packet().await
}

fn check_auth_reply(reply: &Packet, auth_id: i32) -> Result<()> {
    match reply.packet_type(Phase::Authenticating) {
        Some(PacketType::AuthResponse) if reply.id() == auth_id => {
            debug!("AUTH_RESPONSE accepted (id: {})", auth_id);
            Ok(())
        }
        Some(PacketType::AuthResponse) if reply.id() == AUTH_REJECTED_ID => {
            Err(ProtocolError::AuthenticationFailed)
        }
        Some(PacketType::AuthResponse) => Err(ProtocolError::ProtocolViolation(format!(
            "auth reply id {} matches neither request id {} nor rejection id {}",
            reply.id(), auth_id, AUTH_REJECTED_ID
        ))),
        other => Err(ProtocolError::ProtocolViolation(format!(
            "expected AUTH_RESPONSE, got {} (id: {})",
            other.map_or_else(|| format!("type {}", reply.kind()), |t| t.to_string()),
            reply.id()
        ))),
    }
}
