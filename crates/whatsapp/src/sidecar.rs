//! Request/acknowledgement plumbing over the sidecar's stdio.

use std::{
    collections::HashMap,
    path::PathBuf,
    pin::Pin,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use {
    async_trait::async_trait,
    relay_channels::{ChannelOutbound, Error, MediaFetcher, Result},
    relay_common::MessageEnvelope,
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
        sync::{Mutex as AsyncMutex, mpsc, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

use crate::types::{ConnectionState, RelayMessage, SidecarMessage, decode_line, encode_line};

/// Default time to wait for a send or download acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

type Writer = Pin<Box<dyn AsyncWrite + Send>>;

/// Sidecar answer to one request.
#[derive(Debug)]
struct Ack {
    success: bool,
    value: Option<String>,
    error: Option<String>,
}

/// Client side of the sidecar protocol.
///
/// Requests carry a fresh `request_id`; the reader task completes the
/// matching waiter when the acknowledgement arrives.
pub struct SidecarClient {
    writer: AsyncMutex<Writer>,
    pending: Mutex<HashMap<String, oneshot::Sender<Ack>>>,
    state: RwLock<ConnectionState>,
    ack_timeout: Duration,
}

impl SidecarClient {
    pub fn new(writer: impl AsyncWrite + Send + 'static, ack_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            writer: AsyncMutex::new(Box::pin(writer)),
            pending: Mutex::new(HashMap::new()),
            state: RwLock::new(ConnectionState::default()),
            ack_timeout,
        })
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected { .. })
    }

    /// Read protocol lines from `reader` until EOF, forwarding inbound
    /// messages to `inbound`.
    ///
    /// When the stream ends every outstanding request fails.
    pub fn spawn_reader(
        self: &Arc<Self>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        inbound: mpsc::Sender<MessageEnvelope>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if !this.handle_line(&line, &inbound).await {
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed to read from sidecar");
                        break;
                    },
                }
            }
            info!("sidecar output closed");
            this.set_state(ConnectionState::Disconnected {
                reason: Some("sidecar exited".into()),
            });
            this.fail_pending();
        })
    }

    /// Returns `false` once the inbound receiver is gone.
    async fn handle_line(&self, line: &str, inbound: &mpsc::Sender<MessageEnvelope>) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }
        let msg = match decode_line(line) {
            Ok(msg) => msg,
            Err(_) => {
                forward_log_line(line);
                return true;
            },
        };

        match msg {
            SidecarMessage::InboundMessage(envelope) => {
                debug!(message_id = %envelope.id, "received inbound message");
                if inbound.send(envelope).await.is_err() {
                    debug!("inbound receiver dropped, stopping sidecar reader");
                    return false;
                }
            },
            SidecarMessage::SendResult {
                request_id,
                success,
                message_id,
                error,
            } => self.complete(&request_id, Ack {
                success,
                value: message_id,
                error,
            }),
            SidecarMessage::MediaResult {
                request_id,
                success,
                path,
                error,
            } => self.complete(&request_id, Ack {
                success,
                value: path.map(|p| p.to_string_lossy().into_owned()),
                error,
            }),
            SidecarMessage::Connected { phone_number } => {
                info!(?phone_number, "chat client connected");
                self.set_state(ConnectionState::Connected { phone_number });
            },
            SidecarMessage::Qr { qr } => {
                info!(qr, "pairing code received, scan it with the phone to link the relay");
                self.set_state(ConnectionState::AwaitingPairing);
            },
            SidecarMessage::Disconnected { reason } => {
                warn!(?reason, "chat client disconnected");
                self.set_state(ConnectionState::Disconnected { reason });
            },
            SidecarMessage::Error { error } => {
                warn!(error, "sidecar error");
            },
        }
        true
    }

    fn complete(&self, request_id: &str, ack: Ack) {
        let waiter = self.lock_pending().remove(request_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(ack);
            },
            None => debug!(request_id, "acknowledgement for unknown or expired request"),
        }
    }

    fn fail_pending(&self) {
        let drained: Vec<_> = self.lock_pending().drain().collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "dropping unacknowledged sidecar requests");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        match self.state.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Ack>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn write(&self, msg: &RelayMessage) -> Result<()> {
        let line = encode_line(msg).map_err(|e| Error::external("encode sidecar request", e))?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::external("write to sidecar", e))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::external("flush sidecar stdin", e))
    }

    async fn request(
        &self,
        operation: &'static str,
        build: impl FnOnce(String) -> RelayMessage,
    ) -> Result<Ack> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(request_id.clone(), tx);

        if let Err(e) = self.write(&build(request_id.clone())).await {
            self.lock_pending().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(_)) => Err(Error::unavailable("sidecar exited before acknowledging")),
            Err(_) => {
                self.lock_pending().remove(&request_id);
                Err(Error::timeout(operation))
            },
        }
    }
}

#[async_trait]
impl ChannelOutbound for SidecarClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String> {
        let ack = self
            .request("send_text", |request_id| RelayMessage::SendText {
                request_id,
                chat_id: chat_id.to_string(),
                text: text.to_string(),
            })
            .await?;
        match ack {
            Ack {
                success: true,
                value: Some(message_id),
                ..
            } => Ok(message_id),
            Ack { success: true, .. } => {
                Err(Error::rejected("send acknowledged without a message id"))
            },
            Ack { error, .. } => Err(Error::rejected(
                error.unwrap_or_else(|| "send failed".to_string()),
            )),
        }
    }
}

#[async_trait]
impl MediaFetcher for SidecarClient {
    async fn download_media(&self, message_id: &str) -> Result<PathBuf> {
        let ack = self
            .request("download_media", |request_id| RelayMessage::DownloadMedia {
                request_id,
                message_id: message_id.to_string(),
            })
            .await?;
        match ack {
            Ack {
                success: true,
                value: Some(path),
                ..
            } => Ok(PathBuf::from(path)),
            Ack { success: true, .. } => {
                Err(Error::rejected("download acknowledged without a path"))
            },
            Ack { error, .. } => Err(Error::rejected(
                error.unwrap_or_else(|| "download failed".to_string()),
            )),
        }
    }
}

/// Forward a non-protocol output line to tracing, honoring pino-style
/// numeric levels when the line is JSON.
fn forward_log_line(line: &str) {
    if line.starts_with('{')
        && let Ok(log) = serde_json::from_str::<serde_json::Value>(line)
    {
        let level = log
            .get("level")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(30);
        let msg = log
            .get("msg")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(line);
        match level {
            10 | 20 => debug!(target: "chat_sidecar", "{msg}"),
            30 => info!(target: "chat_sidecar", "{msg}"),
            40 => warn!(target: "chat_sidecar", "{msg}"),
            _ => error!(target: "chat_sidecar", "{msg}"),
        }
        return;
    }
    info!(target: "chat_sidecar", "{line}");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, duplex},
    };

    /// A client wired to in-memory pipes, plus the sidecar's ends.
    struct Wired {
        client: Arc<SidecarClient>,
        /// What the client wrote, as the sidecar sees it.
        requests: Lines<BufReader<DuplexStream>>,
        /// Where the fake sidecar writes its output.
        sidecar_out: DuplexStream,
        inbound: mpsc::Receiver<MessageEnvelope>,
        reader: JoinHandle<()>,
    }

    fn wire(ack_timeout: Duration) -> Wired {
        let (client_stdin, sidecar_stdin) = duplex(64 * 1024);
        let (sidecar_out, client_stdout) = duplex(64 * 1024);
        let client = SidecarClient::new(client_stdin, ack_timeout);
        let (tx, inbound) = mpsc::channel(8);
        let reader = client.spawn_reader(client_stdout, tx);
        Wired {
            client,
            requests: BufReader::new(sidecar_stdin).lines(),
            sidecar_out,
            inbound,
            reader,
        }
    }

    async fn next_request(w: &mut Wired) -> serde_json::Value {
        let line = w.requests.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn emit(w: &mut Wired, line: &str) {
        w.sidecar_out.write_all(line.as_bytes()).await.unwrap();
        w.sidecar_out.write_all(b"\n").await.unwrap();
    }

    #[tokio::test]
    async fn send_text_returns_acknowledged_id() {
        let mut w = wire(Duration::from_secs(5));
        let client = Arc::clone(&w.client);
        let send = tokio::spawn(async move { client.send_text("123@s.whatsapp.net", "🤖 hi").await });

        let req = next_request(&mut w).await;
        assert_eq!(req["type"], "send_text");
        assert_eq!(req["chat_id"], "123@s.whatsapp.net");
        assert_eq!(req["text"], "🤖 hi");
        let ack = format!(
            r#"{{"type":"send_result","request_id":"{}","success":true,"message_id":"3EB0AA"}}"#,
            req["request_id"].as_str().unwrap()
        );
        emit(&mut w, &ack).await;

        assert_eq!(send.await.unwrap().unwrap(), "3EB0AA");
    }

    #[tokio::test]
    async fn failed_send_is_rejected() {
        let mut w = wire(Duration::from_secs(5));
        let client = Arc::clone(&w.client);
        let send = tokio::spawn(async move { client.send_text("x", "y").await });

        let req = next_request(&mut w).await;
        let ack = format!(
            r#"{{"type":"send_result","request_id":"{}","success":false,"error":"not connected"}}"#,
            req["request_id"].as_str().unwrap()
        );
        emit(&mut w, &ack).await;

        let err = send.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Rejected { ref message } if message == "not connected"));
    }

    #[tokio::test]
    async fn unacknowledged_send_times_out() {
        let mut w = wire(Duration::from_millis(100));
        let err = w.client.send_text("x", "y").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { ref operation } if operation == "send_text"));
        // The request was written even though nobody answered.
        assert_eq!(next_request(&mut w).await["type"], "send_text");
        assert!(w.client.lock_pending().is_empty());
    }

    #[tokio::test]
    async fn download_returns_path() {
        let mut w = wire(Duration::from_secs(5));
        let client = Arc::clone(&w.client);
        let download = tokio::spawn(async move { client.download_media("m1").await });

        let req = next_request(&mut w).await;
        assert_eq!(req["type"], "download_media");
        assert_eq!(req["message_id"], "m1");
        let ack = format!(
            r#"{{"type":"media_result","request_id":"{}","success":true,"path":"/tmp/m1.ogg"}}"#,
            req["request_id"].as_str().unwrap()
        );
        emit(&mut w, &ack).await;

        assert_eq!(download.await.unwrap().unwrap(), PathBuf::from("/tmp/m1.ogg"));
    }

    #[tokio::test]
    async fn routes_inbound_and_tracks_state() {
        let mut w = wire(Duration::from_secs(5));
        emit(&mut w, "starting up").await;
        emit(&mut w, r#"{"level":30,"msg":"baileys ready"}"#).await;
        emit(&mut w, r#"{"type":"connected","phone_number":"4915112345678"}"#).await;
        emit(
            &mut w,
            r#"{"type":"inbound_message","id":"m1","conversationId":"1@s.whatsapp.net","bodyText":"/status"}"#,
        )
        .await;

        let env = w.inbound.recv().await.unwrap();
        assert_eq!(env.id, "m1");
        assert_eq!(env.body_text, "/status");
        assert!(w.client.is_connected());
    }

    #[tokio::test]
    async fn sidecar_exit_fails_pending_requests() {
        let w = wire(Duration::from_secs(30));
        let client = Arc::clone(&w.client);
        let send = tokio::spawn(async move { client.send_text("x", "y").await });

        // Let the request get registered, then close the sidecar's output.
        let mut requests = w.requests;
        requests.next_line().await.unwrap().unwrap();
        drop(w.sidecar_out);
        w.reader.await.unwrap();

        let err = send.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
        assert!(matches!(
            w.client.state(),
            ConnectionState::Disconnected { .. }
        ));
    }
}
