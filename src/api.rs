//! REST API server for the financial assistant
//!
//! Thin HTTP surface over the orchestrator: session identity validation,
//! per-session turn serialization, and a dashboard read of persisted state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::{welcome_message, Orchestrator};
use crate::error::OrchestrationError;
use crate::models::SessionKey;
use crate::state::SessionState;
use crate::tools::format_amount;

lazy_static! {
    static ref USER_ID_PATTERN: Regex =
        Regex::new(r"^[a-zA-Z]{2,8}\d{2}$").expect("invalid USER_ID_PATTERN regex");
}

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub user_id: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub thread_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub thread_id: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type Reply = (StatusCode, Json<ApiResponse>);

fn failure(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(ApiResponse::error(message.into())))
}

/// =============================
/// Dashboard View
/// =============================

#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub username: String,
    pub currency: String,
    pub total_income: String,
    pub total_expenses: String,
    /// Allocation minus logged expenses; negative when overrun.
    pub remaining_budget: String,
    pub current_savings: String,
    pub expenses_by_category: BTreeMap<String, f64>,
    pub summary: String,
    pub state: SessionState,
}

impl DashboardView {
    pub fn from_state(state: SessionState, currency_default: &str) -> Self {
        let currency = if state.currency.is_empty() {
            currency_default.to_string()
        } else {
            state.currency.clone()
        };
        let with_currency = |amount: f64| format!("{} {}", format_amount(amount), currency);

        let mut expenses_by_category = BTreeMap::new();
        for expense in &state.expenses {
            *expenses_by_category
                .entry(expense.category.clone())
                .or_insert(0.0) += expense.amount;
        }

        Self {
            username: state.username.clone(),
            total_income: with_currency(state.income),
            total_expenses: with_currency(state.expense),
            remaining_budget: with_currency(state.budget_for_expenses - state.expense),
            current_savings: with_currency(state.savings),
            expenses_by_category,
            summary: state.summary.clone(),
            currency,
            state,
        }
    }
}

/// =============================
/// API State
/// =============================

type LockMap = Arc<Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>>;

/// One async mutex per session key; a turn holds it for its whole duration.
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: LockMap,
}

impl SessionLocks {
    pub async fn acquire(&self, key: &SessionKey) -> SessionGuard {
        let lock = {
            let mut locks = self.inner.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;

        SessionGuard {
            key: key.clone(),
            lock,
            guard: Some(guard),
            locks: self.inner.clone(),
        }
    }
}

/// Held session lock. On release the key's entry is dropped from the map
/// once nobody else holds or waits on it.
pub struct SessionGuard {
    key: SessionKey,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.guard.take();

        // Skipped when the map is busy; the next release for this key prunes it.
        if let Ok(mut locks) = self.locks.try_lock() {
            // One reference in the map, one here.
            if Arc::strong_count(&self.lock) == 2 {
                locks.remove(&self.key);
            }
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub locks: SessionLocks,
}

/// =============================
/// Helpers
/// =============================

pub fn is_valid_user_id(user_id: &str) -> bool {
    USER_ID_PATTERN.is_match(user_id)
}

fn session_key(user_id: &str, thread_id: Option<&str>) -> Result<SessionKey, OrchestrationError> {
    if !is_valid_user_id(user_id) {
        return Err(OrchestrationError::InvalidSession(format!(
            "'{}' must be 2-8 letters followed by 2 digits",
            user_id
        )));
    }

    Ok(match thread_id.map(str::trim).filter(|t| !t.is_empty()) {
        Some(thread_id) => SessionKey::new(user_id, thread_id),
        None => SessionKey::for_user(user_id),
    })
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn open_session(
    State(state): State<ApiState>,
    Json(req): Json<OpenSessionRequest>,
) -> Reply {
    let key = match session_key(&req.user_id, req.thread_id.as_deref()) {
        Ok(key) => key,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.orchestrator.load_session(&key).await {
        Ok(session) => {
            info!(session = %key, "Session opened");
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "user_id": key.user_id,
                    "thread_id": key.thread_id,
                    "greeting": welcome_message(&session),
                    "state": session,
                }))),
            )
        }
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to load session: {}", e),
        ),
    }
}

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> Reply {
    let key = match session_key(&req.user_id, req.thread_id.as_deref()) {
        Ok(key) => key,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if req.message.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Message cannot be empty");
    }

    let _guard = state.locks.acquire(&key).await;

    match state.orchestrator.run_turn(&key, &req.message).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "user_id": key.user_id,
                "thread_id": key.thread_id,
                "turn_id": outcome.turn_id,
                "reply": outcome.reply,
                "stages": outcome.stages,
                "state": outcome.state,
            }))),
        ),
        Err(e) => {
            warn!(session = %key, error = %e, "Turn failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Turn failed: {}", e))
        }
    }
}

async fn session_state(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<ThreadQuery>,
) -> Reply {
    let key = match session_key(&user_id, query.thread_id.as_deref()) {
        Ok(key) => key,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.orchestrator.load_session(&key).await {
        Ok(session) => {
            let view = DashboardView::from_state(
                session,
                &state.orchestrator.config().currency_default,
            );
            (StatusCode::OK, Json(ApiResponse::success(view)))
        }
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to load session: {}", e),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState {
        orchestrator,
        locks: SessionLocks::default(),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(open_session))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions/:user_id/state", get(session_state))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::retry::RetryPolicy;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::config::AgentConfig;
    use crate::gateway::{AssistantResponse, ScriptedGateway};
    use crate::models::{Expense, ToolCall};
    use crate::state::StateDefaults;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn router(gateway: ScriptedGateway) -> Router {
        let config = AgentConfig {
            retry: RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
            ..AgentConfig::default()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(config),
            Arc::new(gateway),
            Arc::new(InMemoryCheckpointStore::new()),
        );
        create_router(Arc::new(orchestrator))
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_user_id_validation() {
        for valid in ["ab12", "Chinonso01", "abcdefgh99"] {
            assert!(is_valid_user_id(valid), "{}", valid);
        }
        for invalid in ["a12", "abcdefghi12", "abc1", "abc123", "ab_12", "", "12ab"] {
            assert!(!is_valid_user_id(invalid), "{}", invalid);
        }
    }

    #[test]
    fn test_dashboard_view() {
        let mut state = SessionState::new(&StateDefaults::default());
        state.income = 500_000.0;
        state.budget_for_expenses = 400_000.0;
        state.expense = 450_000.0;
        state.expenses = vec![
            Expense { amount: 400_000.0, category: "Rent".into(), date: None },
            Expense { amount: 50_000.0, category: "Food".into(), date: None },
        ];

        let view = DashboardView::from_state(state, "NGN");
        assert_eq!(view.total_income, "500,000.00 NGN");
        assert_eq!(view.remaining_budget, "-50,000.00 NGN");
        assert_eq!(view.expenses_by_category["Rent"], 400_000.0);
    }

    #[tokio::test]
    async fn test_health() {
        let router = router(ScriptedGateway::new());
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_chat_rejects_invalid_identity() {
        let router = router(ScriptedGateway::new());
        let (status, body) = send(
            &router,
            post_json("/api/chat", json!({"user_id": "x1", "message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_chat_then_reopen_session() {
        let gateway = ScriptedGateway::with_responses(vec![
            Ok(AssistantResponse::with_tool_calls(vec![ToolCall {
                id: "c1".into(),
                name: "set_username".into(),
                args: json!({"username": "Chinonso"}),
            }])),
            Ok(AssistantResponse::text("Nice to meet you, Chinonso!")),
        ]);
        let router = router(gateway);

        let (status, body) = send(
            &router,
            post_json("/api/chat", json!({"user_id": "chinonso01", "message": "I'm Chinonso"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reply"], "Nice to meet you, Chinonso!");
        assert_eq!(body["data"]["thread_id"], "thread_chinonso01");
        assert_eq!(body["data"]["stages"][1], "executing_tools");

        let (status, body) = send(
            &router,
            post_json("/api/sessions", json!({"user_id": "chinonso01"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["greeting"],
            "Welcome back, Chinonso! How may I assist you?"
        );

        let request = Request::builder()
            .uri("/api/sessions/chinonso01/state")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["username"], "Chinonso");
        assert_eq!(body["data"]["total_income"], "0.00 NGN");
    }

    #[tokio::test]
    async fn test_new_session_has_no_greeting() {
        let router = router(ScriptedGateway::new());
        let (status, body) = send(
            &router,
            post_json("/api/sessions", json!({"user_id": "ada12", "thread_id": "budget"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["thread_id"], "budget");
        assert!(body["data"]["greeting"].is_null());
    }

    #[tokio::test]
    async fn test_session_locks_are_per_key() {
        let locks = SessionLocks::default();
        let a = SessionKey::for_user("ada12");
        let b = SessionKey::for_user("bob34");

        let _held = locks.acquire(&a).await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&b)).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&a)).await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn test_session_locks_are_released_from_map() {
        let locks = SessionLocks::default();
        let key = SessionKey::for_user("ada12");

        let first = locks.acquire(&key).await;
        assert_eq!(locks.inner.lock().await.len(), 1);

        let waiter = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _second = locks.acquire(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A waiter keeps the entry alive.
        drop(first);
        assert_eq!(locks.inner.lock().await.len(), 1);

        waiter.await.unwrap();
        assert!(locks.inner.lock().await.is_empty());

        for user in ["ada12", "bob34", "cy56"] {
            let _turn = locks.acquire(&SessionKey::for_user(user)).await;
        }
        assert!(locks.inner.lock().await.is_empty());
    }
}
