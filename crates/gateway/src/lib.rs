//! HTTP chat endpoint for TodoClaw.
//!
//! Exposes `POST /api/chat` for the web UI and `GET /health`.
//!
//! Built on Axum. Every chat request gets its own orchestration run and its
//! own tool process; nothing about a conversation is kept between requests.

pub mod chat;

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use todoclaw_agent::Orchestrator;
use todoclaw_channel::ProcessChannelOpener;
use todoclaw_config::{AppConfig, GatewayConfig};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Orchestrator,
    /// Paired with each caller's token to form the run's credential.
    pub upstream_base_url: String,
}

pub type SharedState = Arc<GatewayState>;

const BODY_LIMIT: usize = 1024 * 1024;

/// Build the router with all gateway routes.
///
/// Layers applied:
/// - CORS for the configured web UI origins
/// - Request body size limit (1 MB)
/// - Per-token rate limiting on chat requests
/// - HTTP trace logging
pub fn build_router(state: SharedState, gateway: &GatewayConfig) -> Router {
    let rate_limiter = Arc::new(RateLimiter::new(
        gateway.rate_limit_per_minute as usize,
        Duration::from_secs(60),
    ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat::chat_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = todoclaw_providers::default_from_config(&config)?;
    let opener = Arc::new(ProcessChannelOpener::from_config(&config.tool_process));
    info!(tool_process = %opener.command().program.display(), "Tool process command resolved");

    let state = Arc::new(GatewayState {
        orchestrator: Orchestrator::from_config(&config, provider, opener),
        upstream_base_url: config.upstream.base_url.clone(),
    });
    let app = build_router(state, &config.gateway);

    info!(addr = %addr, upstream = %config.upstream.base_url, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Keys are hashes of the `Authorization` header, so tokens are not kept.
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<u64, Vec<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the client is within its limit. A limit of 0 disables
    /// limiting.
    fn check(&self, client_key: u64) -> bool {
        if self.max_requests == 0 {
            return true;
        }
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

fn client_key(req: &axum::extract::Request) -> u64 {
    let mut hasher = DefaultHasher::new();
    req.headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.as_bytes())
        .unwrap_or(b"anonymous")
        .hash(&mut hasher);
    hasher.finish()
}

/// Returns 429 when a client exceeds its limit. `/health` is exempt.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    if !limiter.check(client_key(&req)) {
        warn!(path = %req.uri().path(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
