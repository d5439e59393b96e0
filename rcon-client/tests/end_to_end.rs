use futures::{SinkExt, StreamExt};
use rcon_client::{ProtocolError, Session, SessionOptions, SessionState};
use rcon_proto::{Packet, PacketType, Phase, RconCodec};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::codec::Framed;

/// Minimal Source-style RCON server: checks the password, echoes the
/// sentinel, answers commands from a fixed table.
async fn start_mock_server(password: &'static str, answers: HashMap<&'static str, &'static str>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let answers = answers.clone();
            tokio::spawn(async move {
                let mut conn = Framed::new(stream, RconCodec::default());
                let mut authenticated = false;

                while let Some(Ok(packet)) = conn.next().await {
                    let phase = if authenticated {
                        Phase::Executing
                    } else {
                        Phase::Authenticating
                    };

                    match packet.packet_type(phase) {
                        Some(PacketType::Auth) => {
                            authenticated = packet.body().as_ref() == password.as_bytes();
                            let id = if authenticated { packet.id() } else { -1 };
                            conn.send(Packet::empty(packet.id(), PacketType::ResponseValue)).await.unwrap();
                            conn.send(Packet::empty(id, PacketType::AuthResponse)).await.unwrap();
                        }
                        Some(PacketType::ExecCommand) if authenticated => {
                            let command = String::from_utf8_lossy(packet.body()).into_owned();
                            let answer = answers.get(command.as_str()).copied().unwrap_or("");
                            let reply = Packet::new(packet.id(), PacketType::ResponseValue, answer).unwrap();
                            conn.send(reply).await.unwrap();
                        }
                        _ => break,
                    }
                }
            });
        }
    });

    addr
}

fn answers() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("ListPlayers", "0. Survivor, 76561198000000000\n"),
        ("SaveWorld", "World Saved"),
    ])
}

#[tokio::test]
async fn test_list_players_session() {
    let addr = start_mock_server("changeme", answers()).await;
    let mut session = Session::new(
        "127.0.0.1",
        addr.port(),
        "changeme",
        SessionOptions::with_timeout(Duration::from_millis(3000)),
    );

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);

    let body = session.execute("ListPlayers").await.unwrap();
    assert_eq!(body.as_ref(), b"0. Survivor, 76561198000000000\n");

    let body = session.execute("SaveWorld").await.unwrap();
    assert_eq!(body.as_ref(), b"World Saved");

    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);

    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);

    let result = session.execute("ListPlayers").await;
    assert!(matches!(result, Err(ProtocolError::NotAuthenticated)));
}

#[tokio::test]
async fn test_wrong_password_then_reconnect() {
    let addr = start_mock_server("changeme", answers()).await;

    let mut rejected = Session::new("127.0.0.1", addr.port(), "wrong", SessionOptions::default());
    let result = rejected.connect().await;
    assert!(matches!(result, Err(ProtocolError::AuthenticationFailed)));
    assert_eq!(rejected.state(), SessionState::Disconnected);

    let mut session = Session::new("127.0.0.1", addr.port(), "changeme", SessionOptions::default());
    session.connect().await.unwrap();
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_independent_sessions() {
    let addr = start_mock_server("changeme", answers()).await;

    let mut first = Session::new("127.0.0.1", addr.port(), "changeme", SessionOptions::default());
    let mut second = Session::new("127.0.0.1", addr.port(), "changeme", SessionOptions::default());

    let (a, b) = tokio::join!(first.connect(), second.connect());
    a.unwrap();
    b.unwrap();

    let (a, b) = tokio::join!(first.execute("SaveWorld"), second.execute("ListPlayers"));
    assert_eq!(a.unwrap().as_ref(), b"World Saved");
    assert_eq!(b.unwrap().as_ref(), b"0. Survivor, 76561198000000000\n");
}
