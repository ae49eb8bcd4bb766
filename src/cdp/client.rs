use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::error::CdpError;
use super::session::PageSession;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

pub(crate) type PendingSender = oneshot::Sender<Result<Value, CdpError>>;
pub(crate) type PendingMap = Mutex<HashMap<u64, PendingSender>>;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct CdpRequest {
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdpResponse {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpErrorBody>,
}

#[derive(Debug, Deserialize)]
struct CdpErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BrowserVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// One WebSocket connection to a browser's devtools endpoint. Commands are
/// correlated to responses by id; a background task resolves the waiters.
pub struct Connection {
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    request_id: Arc<AtomicU64>,
    pending: Arc<PendingMap>,
    recv_task: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn connect(endpoint: &str) -> Result<Self, CdpError> {
        let version_url = format!("{}/json/version", endpoint.trim_end_matches('/'));
        let version: BrowserVersion = reqwest::get(&version_url)
            .await
            .map_err(|err| CdpError::ConnectionFailed(format!("{version_url}: {err}")))?
            .json()
            .await
            .map_err(|err| CdpError::ConnectionFailed(format!("{version_url}: {err}")))?;

        let (ws_stream, _) =
            tokio_tungstenite::connect_async(&version.web_socket_debugger_url).await?;
        let (ws_sink, ws_source) = ws_stream.split();

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let recv_task = {
            let pending = Arc::clone(&pending);
            tokio::spawn(async move {
                receive_loop(ws_source, pending).await;
            })
        };

        tracing::debug!(url = %version.web_socket_debugger_url, "devtools connected");

        Ok(Self {
            ws_tx: Arc::new(tokio::sync::Mutex::new(ws_sink)),
            request_id: Arc::new(AtomicU64::new(1)),
            pending,
            recv_task,
        })
    }

    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        roundtrip(
            &self.ws_tx,
            &self.pending,
            &self.request_id,
            method,
            params,
            None,
        )
        .await
    }

    /// Open a fresh page target and attach a flat session to it.
    pub async fn open_page(&self) -> Result<PageSession, CdpError> {
        let created = self
            .call("Target.createTarget", Some(json!({"url": "about:blank"})))
            .await?;
        let target_id = created["targetId"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("missing targetId".to_owned()))?
            .to_owned();

        let attached = self
            .call(
                "Target.attachToTarget",
                Some(json!({"targetId": target_id, "flatten": true})),
            )
            .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("missing sessionId".to_owned()))?
            .to_owned();

        let session = PageSession::new(
            session_id,
            Arc::clone(&self.ws_tx),
            Arc::clone(&self.pending),
            Arc::clone(&self.request_id),
        );
        session.enable_domains().await?;
        Ok(session)
    }

    /// Best-effort browser shutdown; the owning process kill is the backstop,
    /// so this never waits long for a browser that stopped answering.
    pub async fn close(&self) {
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            self.call("Browser.close", None),
        )
        .await;
        if let Ok(Err(err)) = result {
            tracing::debug!(?err, "browser close command failed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

async fn receive_loop(mut ws_source: WsSource, pending: Arc<PendingMap>) {
    while let Some(msg) = ws_source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response: CdpResponse = match serde_json::from_str(&text) {
                    Ok(response) => response,
                    Err(err) => {
                        tracing::warn!(?err, "unparseable devtools message");
                        continue;
                    }
                };

                // Events carry no id; this layer only resolves command replies.
                let Some(id) = response.id else { continue };
                let Some(waiter) = pending.lock().remove(&id) else {
                    continue;
                };

                let result = match response.error {
                    Some(error) => Err(CdpError::Protocol {
                        code: error.code,
                        message: error.message,
                    }),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                let _ = waiter.send(result);
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                tracing::debug!(?err, "devtools websocket error");
                break;
            }
            _ => {}
        }
    }
}

pub(crate) async fn roundtrip(
    ws_tx: &tokio::sync::Mutex<WsSink>,
    pending: &PendingMap,
    request_id: &AtomicU64,
    method: &str,
    params: Option<Value>,
    session_id: Option<&str>,
) -> Result<Value, CdpError> {
    let id = request_id.fetch_add(1, Ordering::SeqCst);
    let request = CdpRequest {
        id,
        method: method.to_owned(),
        params,
        session_id: session_id.map(str::to_owned),
    };
    let json = serde_json::to_string(&request)?;

    let (tx, rx) = oneshot::channel();
    pending.lock().insert(id, tx);

    {
        let mut ws = ws_tx.lock().await;
        ws.send(Message::Text(json.into())).await?;
    }

    match tokio::time::timeout(CALL_TIMEOUT, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(CdpError::SessionClosed),
        Err(_) => {
            pending.lock().remove(&id);
            Err(CdpError::Timeout(format!("{method} got no reply")))
        }
    }
}
