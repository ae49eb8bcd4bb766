use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use serde_json::{Value, json};

use super::client::{PendingMap, WsSink, roundtrip};
use super::error::CdpError;

const DEFAULT_WAIT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A devtools session attached to a single page target.
pub struct PageSession {
    session_id: String,
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    pending: Arc<PendingMap>,
    request_id: Arc<AtomicU64>,
}

impl PageSession {
    pub(crate) fn new(
        session_id: String,
        ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
        pending: Arc<PendingMap>,
        request_id: Arc<AtomicU64>,
    ) -> Self {
        Self {
            session_id,
            ws_tx,
            pending,
            request_id,
        }
    }

    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        roundtrip(
            &self.ws_tx,
            &self.pending,
            &self.request_id,
            method,
            params,
            Some(&self.session_id),
        )
        .await
    }

    pub(crate) async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<(), CdpError> {
        let result = self.call("Page.navigate", Some(json!({"url": url}))).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str)
            && !error.is_empty()
        {
            return Err(CdpError::NavigationFailed(format!("{url}: {error}")));
        }

        self.wait_for_load(DEFAULT_WAIT).await?;
        tracing::debug!(url, "navigated");
        Ok(())
    }

    /// Settle after an action that triggers a page transition (form submit).
    /// The old document may still report itself complete right after the
    /// click, so give the navigation a moment to start first.
    pub async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), CdpError> {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        self.wait_for_load(timeout).await
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<(), CdpError> {
        let start = tokio::time::Instant::now();
        loop {
            let state = self.evaluate("document.readyState").await?;
            if let Some(state) = state.as_str()
                && (state == "complete" || state == "interactive")
            {
                return Ok(());
            }

            if start.elapsed() > timeout {
                return Err(CdpError::Timeout("page load".to_owned()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception["text"].as_str().unwrap_or("unknown page error");
            return Err(CdpError::JavaScript(text.to_owned()));
        }

        Ok(result["result"]["value"].clone())
    }

    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), CdpError> {
        let probe = format!("document.querySelector({}) !== null", js_string(selector));
        let start = tokio::time::Instant::now();
        loop {
            if self.evaluate(&probe).await? == Value::Bool(true) {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(CdpError::Timeout(format!("waiting for {selector}")));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Focus an element and insert text through the input pipeline, so the
    /// page sees it as typed rather than script-assigned.
    pub async fn type_into(&self, selector: &str, text: &str) -> Result<(), CdpError> {
        self.wait_for_selector(selector, DEFAULT_WAIT).await?;
        self.evaluate(&format!(
            "document.querySelector({}).focus()",
            js_string(selector)
        ))
        .await?;
        self.call("Input.insertText", Some(json!({"text": text})))
            .await?;
        Ok(())
    }

    pub async fn click(&self, selector: &str) -> Result<(), CdpError> {
        self.wait_for_selector(selector, DEFAULT_WAIT).await?;
        self.evaluate(&format!(
            "document.querySelector({}).click()",
            js_string(selector)
        ))
        .await?;
        Ok(())
    }

    pub async fn input_value(&self, selector: &str) -> Result<String, CdpError> {
        self.wait_for_selector(selector, DEFAULT_WAIT).await?;
        let value = self
            .evaluate(&format!(
                "document.querySelector({}).value",
                js_string(selector)
            ))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }
}

/// Embed arbitrary text as a JS string literal (JSON escaping is a subset).
pub(crate) fn js_string(text: &str) -> String {
    Value::String(text.to_owned()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes_and_backslashes() {
        assert_eq!(js_string(r#"input[name="pdfUrl"]"#), r#""input[name=\"pdfUrl\"]""#);
        assert_eq!(js_string(r"a\b"), r#""a\\b""#);
    }
}
