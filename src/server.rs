use axum::{
    Form, Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Request, State,
        multipart::MultipartRejection,
        rejection::FormRejection,
    },
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::bubble::Bubble;
use crate::config::AppConfig;
use crate::llm::{Answerer, ChatCompletionsAnswerer, UnconfiguredAnswerer};
use crate::page;
use crate::rag::Retrieved;

/// Reply to a submission without a query.
pub const EMPTY_QUERY_ANSWER: &str = "Please enter a query.";

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// File extensions accepted by `/upload`.
const ALLOWED_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let answerer: Arc<dyn Answerer> = match config.llm_settings() {
        Some(settings) => {
            info!(
                name: "llm.config.loaded",
                base_url = %settings.base_url,
                model = %settings.model,
                provider = ?settings.provider,
                "LLM configuration loaded"
            );
            Arc::new(ChatCompletionsAnswerer::new(settings))
        }
        None => {
            tracing::warn!(
                name: "llm.config.missing",
                "No LLM configured (set LLM_BASE_URL and LLM_MODEL); queries will report an error"
            );
            Arc::new(UnconfiguredAnswerer)
        }
    };

    let state = AppState::new(answerer, Arc::clone(&config))?;

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    // A disabled timeout is a very long one, which keeps the layer stack's
    // type the same either way.
    let timeout_duration = if state.config.resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60)
    } else {
        Duration::from_secs(state.config.resilience.request_timeout_secs)
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/chat", get(index_handler).post(chat_handler))
        .route("/upload", post(upload_handler))
        .nest_service("/static", ServeDir::new(&state.config.server.static_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Form body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatForm {
    /// The user's question.
    #[serde(default)]
    pub query: Option<String>,
}

/// JSON body answering `POST /chat`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    /// Text for the bot bubble.
    pub answer: String,
    /// Document chunks the answer was grounded on.
    #[serde(default)]
    pub retrieved: Vec<Retrieved>,
}

/// JSON body answering `POST /upload`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReply {
    /// Name the document is indexed under.
    pub filename: String,
    /// Outcome shown to the user.
    pub message: String,
    /// Chunks added to the index.
    pub num_chunks: usize,
}

/// GET / and GET /chat - the chat page.
async fn index_handler() -> impl IntoResponse {
    Html(page::chat_page())
}

/// POST /chat - answer one query.
///
/// Always answers 200; failures are reported inside `answer`. Requests sent
/// by htmx get the rendered bot bubble instead of JSON.
async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<ChatForm>, FormRejection>,
) -> Response {
    let query = match form {
        Ok(Form(form)) => form.query.unwrap_or_default(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unreadable chat form");
            String::new()
        }
    };

    let (answer, retrieved) = if query.is_empty() {
        (EMPTY_QUERY_ANSWER.to_string(), Vec::new())
    } else {
        info!(
            name: "chat.query.received",
            query_length = query.len(),
            "Received chat query"
        );
        match state.rag.answer(state.answerer.as_ref(), &query).await {
            Ok(reply) => (reply.answer, reply.retrieved),
            Err(e) => {
                tracing::error!(name: "chat.query.failed", error = %e, "Query failed");
                (format!("Error during query: {e}"), Vec::new())
            }
        }
    };

    // The page renders the user bubble itself before the request is sent.
    if is_htmx(&headers) {
        return Html(page::bubble_html(&Bubble::bot(answer))).into_response();
    }

    Json(ChatReply { answer, retrieved }).into_response()
}

/// POST /upload - index one text document.
///
/// Requests without a usable `file` field, or with an unsupported file type,
/// are sent back to the chat page.
async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Upload is not multipart");
            return Redirect::to("/").into_response();
        }
    };

    let (filename, data) = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().map(base_name).unwrap_or_default();
                if filename.is_empty() || !allowed_file(&filename) {
                    tracing::info!(name: "upload.rejected", filename = %filename, "Upload rejected");
                    return Redirect::to("/").into_response();
                }
                break (filename, field.bytes().await);
            }
            Ok(Some(_)) => {}
            Ok(None) => return Redirect::to("/").into_response(),
            Err(e) => {
                tracing::warn!(name: "upload.unreadable", error = %e, "Unreadable upload");
                return Redirect::to("/").into_response();
            }
        }
    };

    let ingested = match data {
        Ok(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => state.rag.ingest(&filename, &text).await,
            Err(e) => Err(anyhow::anyhow!("document is not UTF-8 text: {e}")),
        },
        Err(e) => Err(anyhow::anyhow!("could not read upload: {e}")),
    };

    let (message, num_chunks) = match ingested {
        Ok(report) => (
            format!(
                "Document ingested successfully. {} chunks stored.",
                report.num_chunks
            ),
            report.num_chunks,
        ),
        Err(e) => {
            tracing::error!(name: "upload.failed", filename = %filename, error = %e, "Ingest failed");
            (format!("Failed to ingest document: {e}"), 0)
        }
    };

    if is_htmx(&headers) {
        return Html(page::upload_status_html(&filename, &message)).into_response();
    }

    Json(UploadReply {
        filename,
        message,
        num_chunks,
    })
    .into_response()
}

/// Final path component of a client-supplied file name.
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn allowed_file(filename: &str) -> bool {
    filename.rsplit_once('.').is_some_and(|(_, ext)| {
        ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("hx-request")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_strips_directories() {
        assert_eq!(base_name("../../etc/notes.txt"), "notes.txt");
        assert_eq!(base_name(r"C:\Users\me\scan.md"), "scan.md");
        assert_eq!(base_name("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("notes.TXT"));
        assert!(allowed_file("readme.md"));
        assert!(!allowed_file("scan.pdf"));
        assert!(!allowed_file("noextension"));
    }
}
