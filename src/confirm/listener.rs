//! Loopback TCP server for presenter callbacks

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use super::protocol::{ACK, Message, error_reply};
use crate::registry::{ActionRegistry, Decision, PendingConfirmation};

/// Pause after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A decision taken over the protocol, handed to the daemon for dispatch
#[derive(Debug, Clone)]
pub struct DecisionEvent {
    pub record: PendingConfirmation,
    pub decision: Decision,
    /// Candidate chosen inline with `ACTION:<name>:<hash>`
    pub choice: Option<String>,
}

pub struct Listener {
    inner: TcpListener,
    port: u16,
}

impl Listener {
    /// Bind 127.0.0.1 on the first free port of `ports`
    pub async fn bind(ports: impl IntoIterator<Item = u16>) -> std::io::Result<Self> {
        let mut last_error = None;
        for port in ports {
            match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
                Ok(inner) => {
                    let port = inner.local_addr()?.port();
                    log::info!("Listening for presenter callbacks on 127.0.0.1:{}", port);
                    return Ok(Self { inner, port });
                }
                Err(e) => {
                    log::warn!("Port {} unavailable: {}", port, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no ports to try")))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept connections until the task is dropped
    pub async fn serve(self, registry: Arc<ActionRegistry>, decisions: mpsc::Sender<DecisionEvent>) {
        loop {
            let (stream, peer) = match self.inner.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    log::warn!("Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if !peer.ip().is_loopback() {
                log::warn!("Rejected connection from non-loopback peer {}", peer);
                continue;
            }

            let registry = Arc::clone(&registry);
            let decisions = decisions.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, registry, decisions).await {
                    log::debug!("Connection from {} closed: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ActionRegistry>,
    decisions: mpsc::Sender<DecisionEvent>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(());
        }

        log::debug!("{} -> {}", peer, line.trim());
        let reply = match handle_line(&registry, &line) {
            Ok(Some(event)) => forward(&registry, &decisions, event).await,
            Ok(None) => ACK.to_string(),
            Err(reason) => {
                log::warn!("Rejected '{}' from {}: {}", line.trim(), peer, reason);
                error_reply(&reason)
            }
        };

        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
}

/// Hand a decision to the daemon; the record is retired if the receiver is gone
async fn forward(registry: &ActionRegistry, decisions: &mpsc::Sender<DecisionEvent>, event: DecisionEvent) -> String {
    let hash = event.record.hash.clone();
    match decisions.send(event).await {
        Ok(()) => ACK.to_string(),
        Err(_) => {
            log::error!("Decision receiver is gone, dropping confirmation {}", hash);
            registry.retire(&hash);
            error_reply("daemon is shutting down")
        }
    }
}

/// Apply one protocol line to the registry
pub fn handle_line(registry: &ActionRegistry, line: &str) -> Result<Option<DecisionEvent>, String> {
    let message: Message = line.parse().map_err(|e: super::protocol::ProtocolError| e.to_string())?;

    match message {
        Message::Shown(hash) => {
            registry.mark_shown(&hash).map_err(|e| e.to_string())?;
            log::info!("Confirmation {} shown", hash);
            Ok(None)
        }
        Message::Execute(hash) => decide(registry, &hash, Decision::Execute, None).map(Some),
        Message::Skip(hash) => decide(registry, &hash, Decision::Skip, None).map(Some),
        Message::Action { name, hash } => {
            let record = registry
                .get(&hash)
                .ok_or_else(|| format!("no pending action for hash {}", hash))?;
            let known = record
                .payload
                .actions()
                .iter()
                .any(|a| a.name == name || a.label() == name);
            if !known {
                return Err(format!("unknown action '{}' for hash {}", name, hash));
            }
            decide(registry, &hash, Decision::Execute, Some(name)).map(Some)
        }
    }
}

fn decide(
    registry: &ActionRegistry,
    hash: &str,
    decision: Decision,
    choice: Option<String>,
) -> Result<DecisionEvent, String> {
    let record = registry.decide(hash, decision).map_err(|e| e.to_string())?;
    log::info!("Confirmation {} decided: {:?}", hash, decision);
    Ok(DecisionEvent {
        record,
        decision,
        choice,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Payload, RecordState};
    use crate::rules::{Action, ActionKind, OverwriteRule};
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn action(name: &str) -> Action {
        Action {
            name: name.to_string(),
            display_name: None,
            kind: ActionKind::Dummy,
            rename: None,
            keep_original: true,
            overwrite: OverwriteRule::Replace,
            auto: false,
            annotations: Default::default(),
        }
    }

    #[test]
    fn test_shown_then_racing_executes() {
        let registry = ActionRegistry::new();
        let hash = registry.register(Path::new("/d/a.zip"), Payload::Single(action("x")));

        assert!(handle_line(&registry, &format!("SHOWN:{}", hash)).unwrap().is_none());
        assert_eq!(registry.get(&hash).unwrap().state, RecordState::Shown);

        let first = handle_line(&registry, &format!("EXECUTE:{}", hash));
        let second = handle_line(&registry, &format!("EXECUTE:{}", hash));
        assert_eq!(first.unwrap().unwrap().decision, Decision::Execute);
        assert!(second.unwrap_err().contains("no pending action"));
    }

    #[test]
    fn test_expired_hash_is_miss() {
        let registry = ActionRegistry::new();
        let hash = registry.register(Path::new("/d/a.zip"), Payload::Single(action("x")));
        registry.sweep_expired_at(Instant::now() + Duration::from_secs(600), Duration::from_secs(300));

        assert!(handle_line(&registry, &format!("SKIP:{}", hash)).is_err());
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn test_action_choice() {
        let registry = ActionRegistry::new();
        let hash = registry.register(
            Path::new("/d/a.cbz"),
            Payload::Multiple(vec![action("Manga"), action("Magazines")]),
        );

        assert!(handle_line(&registry, &format!("ACTION:Books:{}", hash)).is_err());
        let event = handle_line(&registry, &format!("ACTION:Magazines:{}", hash))
            .unwrap()
            .unwrap();
        assert_eq!(event.choice.as_deref(), Some("Magazines"));
        assert_eq!(event.decision, Decision::Execute);
    }

    #[test]
    fn test_malformed_line() {
        let registry = ActionRegistry::new();
        assert!(handle_line(&registry, "garbage").is_err());
    }

    #[tokio::test]
    async fn test_decision_without_receiver_retires_record() {
        let registry = ActionRegistry::new();
        let hash = registry.register(Path::new("/d/a.zip"), Payload::Single(action("x")));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let event = handle_line(&registry, &format!("EXECUTE:{}", hash)).unwrap().unwrap();
        let reply = forward(&registry, &tx, event).await;

        assert!(reply.starts_with("ERR "));
        assert!(registry.get(&hash).is_none());
        assert!(registry.pending().is_empty());
    }

    #[tokio::test]
    async fn test_serve_round_trip() {
        let registry = Arc::new(ActionRegistry::new());
        let hash = registry.register(Path::new("/d/a.zip"), Payload::Single(action("x")));

        let listener = Listener::bind([0]).await.unwrap();
        let port = listener.port();
        let (tx, mut rx) = mpsc::channel(4);
        let server = tokio::spawn(listener.serve(Arc::clone(&registry), tx));

        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(format!("SHOWN:{}\n", hash).as_bytes()).await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ACK"));

        writer.write_all(format!("EXECUTE:{}\n", hash).as_bytes()).await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ACK"));

        writer.write_all(format!("EXECUTE:{}\n", hash).as_bytes()).await.unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(reply.starts_with("ERR "));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.record.hash, hash);
        assert!(rx.try_recv().is_err());

        server.abort();
    }
}
