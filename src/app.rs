use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::config::{Config, SiteConfig};
use crate::flipbook::{CdpBrowser, FlipbookRegistrar, Registrar};
use crate::publish;
use crate::report::PublishReport;
use crate::wp;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    site: SiteConfig,
    client: wp::Client,
    registrar: Arc<dyn Registrar>,
}

impl AppState {
    pub fn new(site: SiteConfig, client: wp::Client, registrar: Arc<dyn Registrar>) -> Self {
        Self {
            site,
            client,
            registrar,
        }
    }
}

pub async fn serve(addr: SocketAddr, config: Config) -> anyhow::Result<()> {
    let client = wp::Client::new(&config.site)?;
    let registrar: Arc<dyn Registrar> = Arc::new(FlipbookRegistrar::new(
        Box::new(CdpBrowser::new(
            config.site.base_url.clone(),
            config.browser.clone(),
        )),
        config.site.api_user.clone(),
        config.site.login_password.clone(),
        config.browser.attempts,
    ));
    let state = AppState::new(config.site, client, registrar);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {addr}: {err}"))?;
    tracing::info!(addr = %addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/publish", post(publish_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type PublishError = (StatusCode, Json<serde_json::Value>);

/// One multipart upload in, one publish report out. The PDF only ever lives
/// in this request's buffer; nothing is kept after the pipeline returns.
async fn publish_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PublishReport>, PublishError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(bad_request(format!("read multipart body: {err}"))),
        };
        if field.name() != Some("file") {
            continue;
        }

        let Some(filename) = field.file_name().map(str::to_owned) else {
            return Err(bad_request("file field has no filename".to_owned()));
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|err| bad_request(format!("read upload: {err}")))?;
        file = Some((filename, bytes.to_vec()));
        break;
    }

    let Some((filename, bytes)) = file else {
        return Err(bad_request("no file uploaded".to_owned()));
    };

    let publish_id = uuid::Uuid::new_v4();
    tracing::info!(%publish_id, %filename, size = bytes.len(), "publish requested");

    match publish::run(
        &state.site,
        &state.client,
        state.registrar.as_ref(),
        bytes,
        &filename,
    )
    .await
    {
        Ok(report) => {
            tracing::info!(%publish_id, message = %report.message, "publish finished");
            Ok(Json(report))
        }
        Err(err) => {
            tracing::error!(%publish_id, err = format!("{err:#}"), "publish failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": format!("{err:#}") })),
            ))
        }
    }
}

fn bad_request(message: String) -> PublishError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "message": message })),
    )
}
