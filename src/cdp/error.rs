use thiserror::Error;

#[derive(Debug, Error)]
pub enum CdpError {
    #[error("no chromium executable found; set PRESSFLIP_CHROME")]
    ChromeNotFound,

    #[error("chromium launch failed: {0}")]
    LaunchFailed(String),

    #[error("devtools connection failed: {0}")]
    ConnectionFailed(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("devtools error: {message} (code {code})")]
    Protocol { code: i64, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("page script error: {0}")]
    JavaScript(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("devtools session closed")]
    SessionClosed,

    #[error("invalid devtools response: {0}")]
    InvalidResponse(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CdpError::WebSocket(err.to_string())
    }
}

impl From<reqwest::Error> for CdpError {
    fn from(err: reqwest::Error) -> Self {
        CdpError::Http(err.to_string())
    }
}
