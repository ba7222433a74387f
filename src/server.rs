//! HTTP surface: `POST /convertFile` and a health probe.
//!
//! The handler is a thin adapter. It finds the `file` field of the
//! multipart body and streams it into [`Orchestrator::convert_upload`], then
//! streams the PDF back. All lifecycle decisions live in the orchestrator.
//!
//! Errors become `{"message": "..."}` with 400 for client faults and 500
//! otherwise; the message never carries internal detail.

use crate::delivery::ConvertedDocument;
use crate::error::ConvertError;
use crate::orchestrator::Orchestrator;
use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Room for multipart boundaries and part headers on top of the file itself.
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Origin allowed in addition to `CLIENT_URL`: the upload form's dev server.
pub const DEV_ORIGIN: &str = "http://localhost:5173";

/// Which browser origins may call the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Any origin, no credentials.
    Permissive,
    /// Exactly these origins, with credentials.
    AllowList(Vec<String>),
}

impl CorsPolicy {
    /// `client_url` (if set) plus [`DEV_ORIGIN`].
    pub fn from_client_url(client_url: Option<&str>) -> Self {
        let mut origins: Vec<String> = client_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| u.trim_end_matches('/').to_string())
            .into_iter()
            .collect();
        origins.push(DEV_ORIGIN.to_string());
        origins.dedup();
        CorsPolicy::AllowList(origins)
    }

    fn layer(&self) -> CorsLayer {
        match self {
            CorsPolicy::Permissive => CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([header::CONTENT_DISPOSITION]),
            CorsPolicy::AllowList(origins) => {
                let origins: Vec<HeaderValue> = origins
                    .iter()
                    .filter_map(|o| match o.parse() {
                        Ok(v) => Some(v),
                        Err(_) => {
                            warn!(origin = %o, "ignoring invalid CORS origin");
                            None
                        }
                    })
                    .collect();
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([Method::GET, Method::POST])
                    .allow_headers([header::CONTENT_TYPE])
                    .expose_headers([header::CONTENT_DISPOSITION])
                    .allow_credentials(true)
            }
        }
    }
}

#[derive(Clone)]
struct AppState {
    orchestrator: Orchestrator,
}

/// Build the application router.
pub fn router(orchestrator: Orchestrator, cors: &CorsPolicy) -> Router {
    let body_limit = orchestrator
        .policy()
        .max_bytes()
        .saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(health))
        .route(
            "/convertFile",
            post(convert_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors.layer())
        .with_state(AppState { orchestrator })
}

// ── Responses ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.public_message(),
        });
        (self.status_code(), body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    version: &'static str,
    backend: &'static str,
}

// ── Handlers ─────────────────────────────────────────────────────────────

/// GET /
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        backend: state.orchestrator.backend_name(),
    })
}

/// POST /convertFile
///
/// Multipart body with the document in field `file`. Other fields are
/// ignored; only the first `file` field is converted. A `Content-Length`
/// beyond the size limit plus framing is refused before the body is read.
async fn convert_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ConvertError> {
    let max = state.orchestrator.policy().max_bytes();

    // The declared length covers the whole multipart body, so allow for framing.
    if let Some(declared) = declared_length(&headers) {
        if declared > max.saturating_add(MULTIPART_OVERHEAD) {
            let err = ConvertError::PayloadTooLarge {
                size: declared,
                max,
            };
            warn!("rejecting upload by Content-Length: {err}");
            return Err(err);
        }
    }

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let err = multipart_error(e, max);
                warn!("rejecting upload before the file field: {err}");
                return Err(err);
            }
        };
        if field.name() != Some("file") {
            debug!(field = ?field.name(), "skipping multipart field");
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let body = field.map(move |chunk| chunk.map_err(|e| multipart_error(e, max)));
        let doc = state
            .orchestrator
            .convert_upload(&filename, None, body)
            .await?;
        return deliver(doc).await;
    }

    warn!("upload without a file field");
    Err(ConvertError::MissingFile)
}

async fn deliver(doc: ConvertedDocument) -> Result<Response, ConvertError> {
    let disposition = content_disposition(doc.download_name());
    let len = doc.len();
    let stream = doc.into_stream().await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn multipart_error(e: MultipartError, max: u64) -> ConvertError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ConvertError::PayloadTooLarge {
            size: max.saturating_add(1),
            max,
        }
    } else {
        ConvertError::MalformedUpload {
            detail: e.body_text(),
        }
    }
}

/// `attachment; filename="<ascii>"; filename*=UTF-8''<percent-encoded>`.
///
/// The quoted form has quotes, backslashes, control and non-ASCII
/// characters replaced with `_`; the extended form keeps the real name.
pub fn content_disposition(name: &str) -> String {
    let ascii: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if ascii == name {
        return format!("attachment; filename=\"{ascii}\"");
    }

    let mut encoded = String::with_capacity(name.len() * 3);
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}
