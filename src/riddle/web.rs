//! ==============================================================================
//! web.rs - riddle web server
//! ==============================================================================
//!
//! purpose:
//!     serves the riddle pages. every browser gets a session (cookie keyed)
//!     holding its page state; form posts feed events into the session's state
//!     machine and redirect back to `/`, which renders whatever page the
//!     session is on.
//!
//! routes:
//!     GET  /             render current page (first visit: welcome delay + toast)
//!     POST /begin        Landing -> Upload
//!     POST /upload       multipart "photo", Upload -> Reveal
//!     POST /reveal       form "user_response", runs the vision call
//!     POST /next         Reveal -> Upload, clears the round
//!     GET  /time-lapse   placeholder app
//!     GET  /api/session  json view of the caller's session
//!
//! shared state:
//!     Arc<RiddleApp> holds the session map behind a tokio RwLock. the lock is
//!     never held across the welcome delay or the vision call. sessions idle
//!     for longer than `session_idle_seconds` are dropped, and the map never
//!     holds more than `max_sessions` entries.
//!
//! ==============================================================================

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};
use uuid::Uuid;

use super::pages;
use super::session::{Event, Notice, Page, Session, SessionView, UploadedImage};
use super::vision::{data_url, image_subtype, CaptionService};
use crate::config::RiddleConfig;

pub const SESSION_COOKIE: &str = "riddle_session";

const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

struct TrackedSession {
    session: Session,
    last_seen: Instant,
}

pub struct RiddleApp<V> {
    sessions: RwLock<HashMap<Uuid, TrackedSession>>,
    vision: V,
    prompt: String,
    welcome_delay: Duration,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl<V: CaptionService> RiddleApp<V> {
    pub fn new(vision: V, config: &RiddleConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            vision,
            prompt: config.prompt.clone(),
            welcome_delay: Duration::from_secs(config.welcome_delay_seconds),
            idle_timeout: Duration::from_secs(config.session_idle_seconds),
            max_sessions: config.max_sessions.max(1),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Start a session. Idle sessions are dropped first, then the least
    /// recently seen ones while the map is full.
    async fn open_session(&self) -> Uuid {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, tracked| now.duration_since(tracked.last_seen) < self.idle_timeout);

        while sessions.len() >= self.max_sessions {
            let oldest = sessions.iter().min_by_key(|(_, tracked)| tracked.last_seen).map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }
        if sessions.len() < before {
            tracing::debug!("[RIDDLE] evicted {} sessions", before - sessions.len());
        }

        let id = Uuid::new_v4();
        sessions.insert(id, TrackedSession { session: Session::new(), last_seen: now });
        tracing::info!("[RIDDLE] new session {}", id);
        id
    }

    /// Run `f` against a live session and mark it as seen. None when the
    /// session is unknown or has gone idle.
    async fn with_session<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        let expired = sessions.get(&id)?.last_seen.elapsed() >= self.idle_timeout;
        if expired {
            sessions.remove(&id);
            return None;
        }
        let tracked = sessions.get_mut(&id)?;
        tracked.last_seen = Instant::now();
        Some(f(&mut tracked.session))
    }

    /// Apply `event` to the session, logging instead of failing when the
    /// session is gone or the event does not fit the current page.
    async fn dispatch(&self, id: Uuid, event: Event) {
        if let Some(Err(e)) = self.with_session(id, |session| session.apply(event)).await {
            tracing::debug!("[RIDDLE] session {}: {}", id, e);
        }
    }

    async fn notify(&self, id: Uuid, notice: Notice) {
        self.with_session(id, |session| session.notify(notice)).await;
    }
}

pub fn router<V: CaptionService>(app: Arc<RiddleApp<V>>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index_handler::<V>))
        .route("/begin", post(begin_handler::<V>))
        .route("/upload", post(upload_handler::<V>))
        .route("/reveal", post(reveal_handler::<V>))
        .route("/next", post(next_handler::<V>))
        .route("/time-lapse", get(time_lapse_handler))
        .route("/api/session", get(session_api_handler::<V>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(app)
}

pub async fn serve<V: CaptionService>(app: Arc<RiddleApp<V>>, config: &RiddleConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("[RIDDLE] Cloud riddle live at http://{}", listener.local_addr()?);
    axum::serve(listener, router(app, config.max_upload_bytes)).await?;
    Ok(())
}

/// Session id from the request cookie, if any.
pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find_map(|raw| Uuid::parse_str(raw).ok())
}

async fn index_handler<V: CaptionService>(State(app): State<Arc<RiddleApp<V>>>, headers: HeaderMap) -> Response {
    let known = match session_id(&headers) {
        Some(id) => app.with_session(id, |_| ()).await.map(|_| id),
        None => None,
    };
    let (id, fresh) = match known {
        Some(id) => (id, false),
        None => (app.open_session().await, true),
    };

    let welcome = app.with_session(id, |session| session.take_welcome()).await.unwrap_or(false);
    if welcome && !app.welcome_delay.is_zero() {
        tokio::time::sleep(app.welcome_delay).await;
    }

    let html = app
        .with_session(id, |session| {
            let page = session.settle();
            let notices = session.take_notices();
            match page {
                Page::Landing => pages::landing(&notices),
                Page::Upload => pages::upload(&notices),
                Page::Reveal => pages::reveal(session, &notices),
            }
        })
        .await
        .unwrap_or_else(|| pages::landing(&[]));

    if fresh {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        ([(header::SET_COOKIE, cookie)], Html(html)).into_response()
    } else {
        Html(html).into_response()
    }
}

async fn begin_handler<V: CaptionService>(State(app): State<Arc<RiddleApp<V>>>, headers: HeaderMap) -> Redirect {
    if let Some(id) = session_id(&headers) {
        app.dispatch(id, Event::Begin).await;
    }
    Redirect::to("/")
}

async fn upload_handler<V: CaptionService>(
    State(app): State<Arc<RiddleApp<V>>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Redirect {
    let Some(id) = session_id(&headers) else {
        return Redirect::to("/");
    };
    match read_photo(multipart).await {
        Ok(image) => {
            tracing::info!("[RIDDLE] session {} uploaded {} ({} bytes)", id, image.file_name, image.bytes.len());
            app.dispatch(id, Event::Confirm(image)).await;
        }
        Err(message) => app.notify(id, Notice::Error(message)).await,
    }
    Redirect::to("/")
}

/// Pull the "photo" field out of the form and check it really is an image.
async fn read_photo(mut multipart: Multipart) -> Result<UploadedImage, String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| format!("Upload failed: {}", e))? {
        if field.name() != Some("photo") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("photo").to_string();
        let extension = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(format!("{} is not a jpg, jpeg or png file", file_name));
        }
        let bytes = field.bytes().await.map_err(|e| format!("Upload failed: {}", e))?;
        if bytes.is_empty() {
            return Err("Please choose a photo to upload".to_string());
        }
        let format = image_subtype(&bytes).map_err(|e| format!("{}: {}", file_name, e))?;
        return Ok(UploadedImage { bytes: bytes.to_vec(), format: format.to_string(), file_name });
    }
    Err("Please choose a photo to upload".to_string())
}

#[derive(Deserialize)]
struct RevealForm {
    #[serde(default)]
    user_response: String,
}

async fn reveal_handler<V: CaptionService>(
    State(app): State<Arc<RiddleApp<V>>>,
    headers: HeaderMap,
    Form(form): Form<RevealForm>,
) -> Redirect {
    let Some(id) = session_id(&headers) else {
        return Redirect::to("/");
    };

    let claimed = app
        .with_session(id, |session| {
            session.apply(Event::Respond(form.user_response))?;
            session.begin_analysis()
        })
        .await;
    let request = match claimed {
        Some(Ok(request)) => request,
        Some(Err(e)) => {
            tracing::debug!("[RIDDLE] session {}: {}", id, e);
            return Redirect::to("/");
        }
        None => return Redirect::to("/"),
    };

    let image_url = data_url(&request.image.bytes, &request.image.format);
    let event = match app.vision.caption(image_url, &app.prompt).await {
        Ok(text) => {
            tracing::info!("[RIDDLE] Result: {}", text);
            Event::AnalysisSucceeded { round: request.round, text }
        }
        Err(e) => {
            tracing::error!("[RIDDLE] analysis failed: {:#}", e);
            Event::AnalysisFailed { round: request.round, message: format!("{:#}", e) }
        }
    };
    app.dispatch(id, event).await;
    Redirect::to("/")
}

async fn next_handler<V: CaptionService>(State(app): State<Arc<RiddleApp<V>>>, headers: HeaderMap) -> Redirect {
    if let Some(id) = session_id(&headers) {
        app.dispatch(id, Event::NextCloud).await;
    }
    Redirect::to("/")
}

async fn time_lapse_handler() -> Html<String> {
    Html(pages::time_lapse())
}

/// json api endpoint for programmatic access
async fn session_api_handler<V: CaptionService>(
    State(app): State<Arc<RiddleApp<V>>>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, StatusCode> {
    let id = session_id(&headers).ok_or(StatusCode::NOT_FOUND)?;
    let view = app.with_session(id, |session| SessionView::from(&*session)).await;
    view.map(Json).ok_or(StatusCode::NOT_FOUND)
}
