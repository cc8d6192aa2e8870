//! services/monitor/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{middleware::require_user, state::AppState};
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use paper_watch_core::{
    domain::{Cadence, Paper, SeenMark, Subscription, SubscriptionId, UserId},
    enrich::enrich_or_link,
    ports::PortError,
    scheduler::PassReport,
    search_session::{Handle, SearchError, SearchPage},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        register_user_handler,
        list_subscriptions_handler,
        create_subscription_handler,
        delete_subscription_handler,
        list_seen_handler,
        search_handler,
        navigate_handler,
        select_item_handler,
        run_pass_handler,
    ),
    components(
        schemas(
            UserResponse,
            SubscriptionResponse,
            CreateSubscriptionRequest,
            SeenPaperResponse,
            SearchRequest,
            SearchItemResponse,
            SearchPageResponse,
            SelectedItemResponse,
            RunPassRequest,
            PassReportResponse,
        )
    ),
    tags(
        (name = "Paper Watch API", description = "Topic subscriptions, paper search and manual check passes.")
    )
)]
pub struct ApiDoc;

/// Builds the API router. Every route requires the `x-user-id` header.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users", post(register_user_handler))
        .route(
            "/subscriptions",
            get(list_subscriptions_handler).post(create_subscription_handler),
        )
        .route("/subscriptions/{id}", delete(delete_subscription_handler))
        .route("/seen", get(list_seen_handler))
        .route("/search", post(search_handler))
        .route("/search/page", get(navigate_handler))
        .route("/search/items/{handle}", post(select_item_handler))
        .route("/passes", post(run_pass_handler))
        .layer(axum_middleware::from_fn(require_user))
        .with_state(state)
}

//=========================================================================================
// Error Mapping
//=========================================================================================

type HandlerError = (StatusCode, String);

fn port_failure(e: PortError) -> HandlerError {
    match e {
        PortError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::ForeignKeyViolation(_) => (
            StatusCode::CONFLICT,
            "Unknown user, register first".to_string(),
        ),
        other => {
            error!(error = %other, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
        }
    }
}

fn search_failure(e: SearchError) -> HandlerError {
    let status = match e {
        SearchError::EmptyQuery => StatusCode::BAD_REQUEST,
        SearchError::SessionExpired => StatusCode::GONE,
        SearchError::ItemNotFound(_) => StatusCode::NOT_FOUND,
    };
    (status, e.to_string())
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    user_id: i64,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct SubscriptionResponse {
    id: i64,
    topic: String,
    cadence: String,
    last_checked: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            topic: sub.topic,
            cadence: sub.cadence.to_string(),
            last_checked: sub.last_checked,
            created_at: sub.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    topic: String,
}

#[derive(Serialize, ToSchema)]
pub struct SeenPaperResponse {
    subscription_id: i64,
    item_id: String,
    sent_at: DateTime<Utc>,
}

impl From<SeenMark> for SeenPaperResponse {
    fn from(mark: SeenMark) -> Self {
        Self {
            subscription_id: mark.subscription_id,
            item_id: mark.item_id,
            sent_at: mark.sent_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SearchRequest {
    query: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Zero-based offset of the first result on the page.
    offset: usize,
}

#[derive(Serialize, ToSchema)]
pub struct SearchItemResponse {
    /// Opaque token for `POST /search/items/{handle}`, valid while this page is current.
    handle: String,
    title: String,
    year: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct SearchPageResponse {
    query: String,
    offset: usize,
    items: Vec<SearchItemResponse>,
    next_offset: Option<usize>,
    previous_offset: Option<usize>,
}

impl From<SearchPage> for SearchPageResponse {
    fn from(page: SearchPage) -> Self {
        let next_offset = page.next_offset();
        let previous_offset = page.previous_offset();
        Self {
            query: page.query,
            offset: page.offset,
            items: page
                .entries
                .into_iter()
                .map(|entry| SearchItemResponse {
                    handle: entry.handle.to_string(),
                    title: entry.paper.title,
                    year: entry.paper.year,
                })
                .collect(),
            next_offset,
            previous_offset,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SelectedItemResponse {
    title: String,
    year: Option<i32>,
    link: String,
    /// The summary page, or the paper link when enrichment failed.
    page_url: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RunPassRequest {
    /// Bypasses the update window and the once-per-day throttle.
    #[serde(default = "force_by_default")]
    force: bool,
}

fn force_by_default() -> bool {
    true
}

#[derive(Serialize, ToSchema)]
pub struct PassReportResponse {
    outside_window: bool,
    not_due: usize,
    checked: usize,
    failed: usize,
    delivered: usize,
    undelivered: usize,
}

impl From<PassReport> for PassReportResponse {
    fn from(report: PassReport) -> Self {
        Self {
            outside_window: report.outside_window,
            not_due: report.not_due,
            checked: report.checked,
            failed: report.failed,
            delivered: report.delivered,
            undelivered: report.undelivered,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Register the calling user. Idempotent.
#[utoipa::path(
    post,
    path = "/users",
    responses(
        (status = 200, description = "User registered", body = UserResponse),
        (status = 401, description = "Missing or invalid x-user-id header")
    ),
    params(("x-user-id" = i64, Header, description = "Chat id of the user."))
)]
pub async fn register_user_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
) -> Result<impl IntoResponse, HandlerError> {
    let user = app_state.ledger.register_user(user_id).await.map_err(port_failure)?;
    Ok(Json(UserResponse {
        user_id: user.user_id,
        created_at: user.created_at,
    }))
}

/// List the caller's subscriptions.
#[utoipa::path(
    get,
    path = "/subscriptions",
    responses(
        (status = 200, description = "Subscriptions in creation order", body = [SubscriptionResponse])
    ),
    params(("x-user-id" = i64, Header, description = "Chat id of the user."))
)]
pub async fn list_subscriptions_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
) -> Result<impl IntoResponse, HandlerError> {
    let subs = app_state
        .ledger
        .list_subscriptions(user_id)
        .await
        .map_err(port_failure)?;
    Ok(Json(
        subs.into_iter()
            .map(SubscriptionResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Subscribe the caller to a topic with a daily cadence.
#[utoipa::path(
    post,
    path = "/subscriptions",
    request_body = CreateSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionResponse),
        (status = 400, description = "Empty topic")
    ),
    params(("x-user-id" = i64, Header, description = "Chat id of the user."))
)]
pub async fn create_subscription_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let ledger = &app_state.ledger;
    ledger.register_user(user_id).await.map_err(port_failure)?;
    let id = ledger
        .create_subscription(user_id, payload.topic.trim(), Cadence::Daily)
        .await
        .map_err(port_failure)?;
    let sub = ledger.get_subscription(id).await.map_err(port_failure)?;

    info!(user_id, subscription_id = id, topic = %sub.topic, "Subscription created");
    Ok((StatusCode::CREATED, Json(SubscriptionResponse::from(sub))))
}

/// Delete one of the caller's subscriptions. Papers already delivered stay seen.
#[utoipa::path(
    delete,
    path = "/subscriptions/{id}",
    responses(
        (status = 204, description = "Subscription deleted"),
        (status = 404, description = "No such subscription for this user")
    ),
    params(
        ("id" = i64, Path, description = "Subscription id."),
        ("x-user-id" = i64, Header, description = "Chat id of the user.")
    )
)]
pub async fn delete_subscription_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, HandlerError> {
    let not_found = || (StatusCode::NOT_FOUND, format!("Subscription {} not found", id));

    let sub = app_state
        .ledger
        .get_subscription(id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => not_found(),
            other => port_failure(other),
        })?;
    if sub.user_id != user_id {
        return Err(not_found());
    }

    if !app_state
        .ledger
        .delete_subscription(id)
        .await
        .map_err(port_failure)?
    {
        return Err(not_found());
    }
    info!(user_id, subscription_id = id, "Subscription deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// List every paper delivered to the caller, oldest first.
#[utoipa::path(
    get,
    path = "/seen",
    responses((status = 200, description = "Delivered papers", body = [SeenPaperResponse])),
    params(("x-user-id" = i64, Header, description = "Chat id of the user."))
)]
pub async fn list_seen_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
) -> Result<impl IntoResponse, HandlerError> {
    let marks = app_state
        .ledger
        .list_seen_marks(user_id)
        .await
        .map_err(port_failure)?;
    Ok(Json(
        marks
            .into_iter()
            .map(SeenPaperResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Start a new search, replacing the caller's previous one.
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "First page of results", body = SearchPageResponse),
        (status = 400, description = "Empty query")
    ),
    params(("x-user-id" = i64, Header, description = "Chat id of the user."))
)]
pub async fn search_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Json(payload): Json<SearchRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let page = app_state
        .search
        .search(user_id, &payload.query)
        .await
        .map_err(search_failure)?;
    Ok(Json(SearchPageResponse::from(page)))
}

/// Move the caller's active search to another page.
#[utoipa::path(
    get,
    path = "/search/page",
    params(
        PageQuery,
        ("x-user-id" = i64, Header, description = "Chat id of the user.")
    ),
    responses(
        (status = 200, description = "Requested page", body = SearchPageResponse),
        (status = 410, description = "No active search session")
    )
)]
pub async fn navigate_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let page = app_state
        .search
        .navigate(user_id, page.offset)
        .await
        .map_err(search_failure)?;
    Ok(Json(SearchPageResponse::from(page)))
}

/// Open one result of the current page, publishing its summary page.
#[utoipa::path(
    post,
    path = "/search/items/{handle}",
    responses(
        (status = 200, description = "Selected paper", body = SelectedItemResponse),
        (status = 404, description = "Handle is not on the current page"),
        (status = 410, description = "No active search session")
    ),
    params(
        ("handle" = String, Path, description = "Handle from the current page."),
        ("x-user-id" = i64, Header, description = "Chat id of the user.")
    )
)]
pub async fn select_item_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Path(handle): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let handle: Handle = handle.parse().map_err(search_failure)?;
    let paper: Paper = app_state
        .search
        .select_item(user_id, &handle)
        .map_err(search_failure)?;

    let page_url = enrich_or_link(app_state.enricher.as_ref(), &paper).await;
    Ok(Json(SelectedItemResponse {
        title: paper.title,
        year: paper.year,
        link: paper.link,
        page_url,
    }))
}

/// Run a check pass now. Restricted to `ADMIN_USER_IDS`; `force` defaults to true.
#[utoipa::path(
    post,
    path = "/passes",
    request_body = RunPassRequest,
    responses(
        (status = 200, description = "What the pass did", body = PassReportResponse),
        (status = 403, description = "Caller is not an administrator")
    ),
    params(("x-user-id" = i64, Header, description = "Chat id of the user."))
)]
pub async fn run_pass_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<UserId>,
    Json(payload): Json<RunPassRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if !app_state.config.admin_user_ids.contains(&user_id) {
        warn!(user_id, "Manual pass refused for a non-admin user");
        return Err((
            StatusCode::FORBIDDEN,
            "Manual passes are restricted to administrators".to_string(),
        ));
    }
    info!(user_id, force = payload.force, "Manual subscription pass requested");
    let report = app_state.scheduler.run_pass(Utc::now(), payload.force).await;
    Ok(Json(PassReportResponse::from(report)))
}
