use std::time::Duration;

use anyhow::Context as _;
use base64::Engine as _;
use serde::Deserialize;

use crate::config::SiteConfig;

/// Authenticated client for the site's content REST API. Carries no state
/// beyond the connection pool and the precomputed credential header.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
}

/// A media library entry, as returned by search and upload.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub id: u64,
    pub source_url: String,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    content: RenderedField,
}

#[derive(Debug, Deserialize)]
struct RenderedField {
    rendered: String,
}

impl Client {
    pub fn new(site: &SiteConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build content api http client")?;

        let credentials = format!("{}:{}", site.api_user, site.api_password);
        let auth_header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        );

        Ok(Self {
            http,
            base_url: site.base_url.trim_end_matches('/').to_owned(),
            auth_header,
        })
    }

    fn media_endpoint(&self) -> String {
        format!("{}/wp-json/wp/v2/media", self.base_url)
    }

    fn page_endpoint(&self, page_id: u64) -> String {
        format!("{}/wp-json/wp/v2/pages/{page_id}", self.base_url)
    }

    /// Search the media library by title. The remote matches loosely; the
    /// caller treats any non-empty result as "this filename is taken".
    pub async fn search_media(&self, name: &str) -> anyhow::Result<Vec<MediaItem>> {
        let endpoint = self.media_endpoint();
        let response = self
            .http
            .get(&endpoint)
            .query(&[("search", name)])
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .send()
            .await
            .with_context(|| format!("GET {endpoint}"))?;

        let raw = read_success_body(response).await?;
        serde_json::from_str(&raw).context("parse media search response")
    }

    pub async fn media_exists(&self, name: &str) -> anyhow::Result<bool> {
        Ok(!self.search_media(name).await?.is_empty())
    }

    /// Resolve the public URL of an already-uploaded file by its name.
    pub async fn media_url(&self, name: &str) -> anyhow::Result<Option<String>> {
        let items = self.search_media(name).await?;
        Ok(items.into_iter().next().map(|item| item.source_url))
    }

    pub async fn upload_media(&self, bytes: Vec<u8>, filename: &str) -> anyhow::Result<MediaItem> {
        let endpoint = self.media_endpoint();
        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_owned())
            .mime_str("application/pdf")
            .context("build media file part")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("title", filename.to_owned())
            .text("alt_text", format!("PDF file: {filename}"));

        let response = self
            .http
            .post(&endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("POST {endpoint}"))?;

        let raw = read_success_body(response).await?;
        serde_json::from_str(&raw).context("parse media upload response")
    }

    /// Fetch the rendered markup of a page. Never cached; mutators refetch
    /// immediately before rewriting.
    pub async fn page_content(&self, page_id: u64) -> anyhow::Result<String> {
        let endpoint = self.page_endpoint(page_id);
        let response = self
            .http
            .get(&endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .send()
            .await
            .with_context(|| format!("GET {endpoint}"))?;

        let raw = read_success_body(response).await?;
        let page: PageBody = serde_json::from_str(&raw).context("parse page response")?;
        Ok(page.content.rendered)
    }

    pub async fn update_page(&self, page_id: u64, content: &str) -> anyhow::Result<()> {
        let endpoint = self.page_endpoint(page_id);
        let response = self
            .http
            .post(&endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .with_context(|| format!("POST {endpoint}"))?;

        read_success_body(response).await?;
        Ok(())
    }
}

async fn read_success_body(response: reqwest::Response) -> anyhow::Result<String> {
    let status = response.status();
    let raw = response.text().await.context("read response body")?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        anyhow::bail!("WordPress API error ({status}): {message}");
    }
    Ok(raw)
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("message")?.as_str()?.to_owned();
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client::new(&SiteConfig {
            base_url: "https://example.com/".to_owned(),
            api_user: "svc".to_owned(),
            api_password: "app pass".to_owned(),
            login_password: "unused".to_owned(),
            archive_page_id: 1,
            viewer_page_id: 2,
            fallback_flipbook_id: 20,
        })
        .expect("build client")
    }

    #[test]
    fn endpoints_drop_trailing_slash() {
        let client = test_client();
        assert_eq!(client.media_endpoint(), "https://example.com/wp-json/wp/v2/media");
        assert_eq!(
            client.page_endpoint(1272),
            "https://example.com/wp-json/wp/v2/pages/1272"
        );
    }

    #[test]
    fn auth_header_is_basic_base64() {
        let client = test_client();
        let expected = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("svc:app pass")
        );
        assert_eq!(client.auth_header, expected);
    }

    #[test]
    fn error_message_prefers_remote_detail() {
        let raw = r#"{"code":"rest_cannot_create","message":"Sorry, you are not allowed."}"#;
        assert_eq!(
            parse_error_message(raw).as_deref(),
            Some("Sorry, you are not allowed.")
        );
        assert_eq!(parse_error_message("<html>gateway timeout</html>"), None);
    }
}
