//! api-server — HTTP API for the contact intake service.
//!
//! Accepts contact form submissions on `POST /add`, stores each one in its own
//! database transaction and then emails a notification in the background:
//! - Storage: MySQL (default), SQLite file (`sqlite` feature) or in-memory.
//! - Email: Resend API first, SMTP with a CSV attachment as fallback.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN for the form frontend.
//!
//! Run:
//! ```bash
//! # local, no database server needed
//! STORAGE_PROVIDER=sqlite RECIPIENT_EMAIL=me@example.com cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderValue;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_repo::InMemoryContactRepo;
use domain::service::ContactService;
use domain::{
    BoxTask, Contact, ContactId, ContactRepository, CoreError, NewContact, Notifier,
    PersistStage, TaskSpawner,
};
use mailer::{FallbackDispatcher, MailerError, ResendBackend, SmtpBackend};
use mysql_adapter::MysqlContactRepo;
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Storage selected at startup; sqlite is feature-gated.
enum AnyRepo {
    Memory(InMemoryContactRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteContactRepo),
    Mysql(MysqlContactRepo),
}

#[async_trait]
impl ContactRepository for AnyRepo {
    async fn insert(&self, new: NewContact) -> Result<Contact, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.insert(new).await,
            #[cfg(feature = "sqlite")]
            AnyRepo::Sqlite(r) => r.insert(new).await,
            AnyRepo::Mysql(r) => r.insert(new).await,
        }
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.get(id).await,
            #[cfg(feature = "sqlite")]
            AnyRepo::Sqlite(r) => r.get(id).await,
            AnyRepo::Mysql(r) => r.get(id).await,
        }
    }

    async fn count(&self) -> Result<u64, CoreError> {
        match self {
            AnyRepo::Memory(r) => r.count().await,
            #[cfg(feature = "sqlite")]
            AnyRepo::Sqlite(r) => r.count().await,
            AnyRepo::Mysql(r) => r.count().await,
        }
    }
}

/// Runs notifications on the tokio runtime, tracked so shutdown can wait for them.
#[derive(Clone, Default)]
struct TokioSpawner {
    tracker: TaskTracker,
}

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, task: BoxTask) {
        self.tracker.spawn(task);
    }
}

type Service = ContactService<AnyRepo, dyn Notifier, Arc<dyn TaskSpawner>>;

#[derive(Clone)]
struct AppState {
    service: Arc<Service>,
}

impl AppState {
    fn new(repo: AnyRepo, notifier: Arc<dyn Notifier>, spawner: Arc<dyn TaskSpawner>) -> Self {
        Self {
            service: Arc::new(ContactService::new(repo, notifier, spawner)),
        }
    }
}

#[tokio::main]
async fn main() {
    // Optional .env; real environment variables take precedence
    let dotenv = dotenvy::dotenv();

    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    match dotenv {
        Ok(path) => info!(path = %path.display(), ".env loaded"),
        Err(_) => info!("no .env file; using process environment"),
    }
    cfg.warn_if_insecure();

    let repo = match build_repo(&cfg).await {
        Ok(r) => r,
        Err(e) => {
            error!(err = %e, "storage initialisation failed");
            std::process::exit(1);
        }
    };
    let notifier = match build_notifier(&cfg) {
        Ok(n) => n,
        Err(e) => {
            error!(err = %e, "email client initialisation failed");
            std::process::exit(1);
        }
    };

    let spawner = TokioSpawner::default();
    let tracker = spawner.tracker.clone();
    let state = AppState::new(repo, notifier, Arc::new(spawner));
    let app = router(state, &cfg.cors_allow_origin);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    info!(%addr, "api-server listening");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(err = %e, "server error");
    }

    tracker.close();
    if tokio::time::timeout(cfg.shutdown_grace, tracker.wait())
        .await
        .is_err()
    {
        warn!(
            pending = tracker.len(),
            grace_secs = cfg.shutdown_grace.as_secs(),
            "shutdown grace elapsed; abandoning in-flight notifications"
        );
    }
    info!("api-server stopped");
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct the repository selected by config. MySQL connects here, once.
async fn build_repo(cfg: &config::Config) -> Result<AnyRepo, CoreError> {
    match cfg.storage_provider {
        config::StorageProvider::Memory => Ok(AnyRepo::Memory(InMemoryContactRepo::new())),
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => {
            info!(path = %cfg.db_path.display(), "opening sqlite database");
            let repo = sqlite_adapter::SqliteContactRepo::open_or_create(&cfg.db_path)?
                .with_tx_timeout(cfg.tx_timeout);
            Ok(AnyRepo::Sqlite(repo))
        }
        #[cfg(not(feature = "sqlite"))]
        config::StorageProvider::Sqlite => Err(CoreError::Repository(
            "STORAGE_PROVIDER=sqlite but api-server was built without the `sqlite` feature".into(),
        )),
        config::StorageProvider::Mysql => {
            let settings = cfg.mysql.as_ref().ok_or_else(|| {
                CoreError::Repository("MySQL settings missing for STORAGE_PROVIDER=mysql".into())
            })?;
            Ok(AnyRepo::Mysql(MysqlContactRepo::connect(settings).await?))
        }
    }
}

fn build_notifier(cfg: &config::Config) -> Result<Arc<dyn Notifier>, MailerError> {
    let primary = ResendBackend::new(cfg.resend.clone(), cfg.send_timeout)?;
    let fallback = SmtpBackend::new(cfg.smtp.clone(), cfg.send_timeout);
    Ok(Arc::new(FallbackDispatcher::new(
        primary,
        fallback,
        cfg.recipients.clone(),
        cfg.send_timeout,
    )))
}

fn cors_layer(origin: &HeaderValue) -> CorsLayer {
    if origin == HeaderValue::from_static("*") {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin.clone()))
        .allow_methods([
            axum::http::Method::POST,
            axum::http::Method::GET,
            axum::http::Method::OPTIONS,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}

fn router(state: AppState, cors_origin: &HeaderValue) -> Router {
    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/add", post(add_contact).options(preflight))
        .route("/health", get(health))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(err = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(err = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

/// Body of `POST /add`. Absent or null fields become empty strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddContactReq {
    nom: Option<String>,
    /// Older form builds post `name`; `nom` wins when both are sent.
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    formation: Option<String>,
    message: Option<String>,
}

impl From<AddContactReq> for NewContact {
    fn from(req: AddContactReq) -> Self {
        NewContact {
            nom: req.nom.or(req.name).unwrap_or_default(),
            email: req.email.unwrap_or_default(),
            phone: req.phone.unwrap_or_default(),
            formation: req.formation.unwrap_or_default(),
            message: req.message.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct ContactOut {
    id: i64,
    nom: String,
    email: String,
    phone: String,
    formation: String,
    message: String,
}

impl From<Contact> for ContactOut {
    fn from(c: Contact) -> Self {
        ContactOut {
            id: c.id.get(),
            nom: c.nom,
            email: c.email,
            phone: c.phone,
            formation: c.formation,
            message: c.message,
        }
    }
}

fn failure_code(err: &CoreError) -> &'static str {
    match err {
        CoreError::Persistence {
            stage: PersistStage::Insert | PersistStage::LastInsertId,
            ..
        } => "insert_failed",
        CoreError::Persistence {
            stage: PersistStage::Commit,
            ..
        } => "commit_failed",
        _ => "internal",
    }
}

async fn add_contact(
    State(state): State<AppState>,
    payload: Result<Json<AddContactReq>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "rejected contact payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(http_common::json_failure("bad_request")),
            )
                .into_response();
        }
    };

    match state.service.submit(req.into()).await {
        Ok(contact) => {
            info!(contact_id = %contact.id, "contact added");
            (
                StatusCode::OK,
                Json(http_common::json_success(
                    "Contact ajouté avec succès",
                    ContactOut::from(contact),
                )),
            )
                .into_response()
        }
        Err(e) => {
            error!(err = %e, "contact not stored");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(http_common::json_failure(failure_code(&e))),
            )
                .into_response()
        }
    }
}

// Browsers get their preflight answered by the CORS layer; this covers bare OPTIONS.
async fn preflight() -> impl IntoResponse {
    StatusCode::OK
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
