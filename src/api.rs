//! HTTP surface: handlers, response envelopes and the router.
//!
//! Status codes differ per endpoint on purpose. Detail and stream answer 200
//! with `success: false` on upstream failures, while trending and home answer
//! 500 when neither the upstream nor the snapshot store could be read.
//! Clients are expected to branch on `success`.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    catalog::CatalogItem,
    content::{ContentOrchestrator, EpisodeStream, PageRequest},
    error::ContentError,
    gate::{self, cleared_session_cookie, session_cookie},
    security::{Claims, IdentityVerifier},
};

/// Cache policy of the home feed, on success and failure alike.
pub const HOME_CACHE_CONTROL: &str = "public, s-maxage=60, stale-while-revalidate=300";

#[derive(Clone)]
pub struct AppState {
    pub content: Arc<ContentOrchestrator>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub cookie_secure: bool,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    let verifier = Arc::clone(&state.verifier);
    Router::new()
        .route("/health", get(health))
        .route("/content/home", get(home))
        .route("/content/latest", get(latest))
        .route("/content/trending", get(trending))
        .route("/content/search", get(search))
        .route("/content/detail", get(detail))
        .route("/content/stream", get(stream))
        .route("/auth/session", post(create_session))
        .route("/auth/logout", post(logout))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(verifier, gate::access_gate))
        .with_state(state)
}

/// Treats a missing or blank parameter as absent.
fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
}

async fn not_found() -> ApiError {
    ApiError::not_found("endpoint not found")
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true, "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

impl PageQuery {
    fn request(&self) -> PageRequest {
        PageRequest::parse(self.page.as_deref(), self.limit.as_deref())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingResponse {
    success: bool,
    data: Vec<CatalogItem>,
    page: usize,
    has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn latest(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Response {
    let request = query.request();
    match state.content.latest(request).await {
        Ok(listing) => Json(ListingResponse {
            success: true,
            data: listing.page.items,
            page: listing.page.page,
            has_more: listing.page.has_more,
            error: None,
        })
        .into_response(),
        Err(err) => {
            error!(endpoint = "latest", page = request.page, error = %err, "latest unavailable");
            Json(ListingResponse {
                success: false,
                data: Vec::new(),
                page: request.page,
                has_more: false,
                error: Some("latest releases are unavailable".into()),
            })
            .into_response()
        }
    }
}

async fn trending(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ListingResponse>> {
    let request = query.request();
    let listing = state.content.trending(request).await.map_err(|err| {
        error!(endpoint = "trending", page = request.page, limit = request.limit, error = %err, "trending unavailable");
        ApiError::internal("trending titles are unavailable")
    })?;

    Ok(Json(ListingResponse {
        success: true,
        data: listing.page.items,
        page: listing.page.page,
        has_more: listing.page.has_more,
        error: None,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HomeResponse {
    trending: Vec<CatalogItem>,
    latest: Vec<CatalogItem>,
    updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn home(State(state): State<AppState>) -> Response {
    let cache_control = [(header::CACHE_CONTROL, HOME_CACHE_CONTROL)];
    match state.content.home().await {
        Ok(feed) => (
            cache_control,
            Json(HomeResponse {
                trending: feed.trending,
                latest: feed.latest,
                updated_at: feed.updated_at.to_rfc3339(),
                error: None,
            }),
        )
            .into_response(),
        Err(err) => {
            error!(endpoint = "home", error = %err, "home feed unavailable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                cache_control,
                Json(HomeResponse {
                    trending: Vec::new(),
                    latest: Vec::new(),
                    updated_at: chrono::Utc::now().to_rfc3339(),
                    error: Some("home feed is unavailable".into()),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    success: bool,
    query: String,
    data: Vec<CatalogItem>,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let query = required(params.q, "q")?;
    let response = match state.content.search(&query).await {
        Ok(results) => SearchResponse {
            success: true,
            count: results.items.len(),
            data: results.items,
            query,
            error: None,
        },
        Err(_) => SearchResponse {
            success: false,
            count: 0,
            data: Vec::new(),
            query,
            error: Some("search is unavailable".into()),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct DetailQuery {
    #[serde(rename = "bookId")]
    book_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailResponse {
    success: bool,
    data: Option<serde_json::Value>,
    book_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn detail(
    State(state): State<AppState>,
    Query(params): Query<DetailQuery>,
) -> ApiResult<Json<DetailResponse>> {
    let book_id = required(params.book_id, "bookId")?;
    let response = match state.content.detail(&book_id).await {
        Ok(data) => DetailResponse {
            success: true,
            data: Some(data),
            book_id,
            error: None,
        },
        Err(err) => DetailResponse {
            success: false,
            data: None,
            error: Some(err.to_string()),
            book_id,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(rename = "bookId")]
    book_id: Option<String>,
    episode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    success: bool,
    data: Option<EpisodeStream>,
    book_id: String,
    episode: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn stream(
    State(state): State<AppState>,
    Query(params): Query<StreamQuery>,
) -> ApiResult<Json<StreamResponse>> {
    let book_id = required(params.book_id, "bookId")?;
    let episode = required(params.episode, "episode")?
        .parse::<u32>()
        .ok()
        .filter(|episode| *episode > 0)
        .ok_or_else(|| ApiError::bad_request("episode must be a positive integer"))?;

    match state.content.stream(&book_id, episode).await {
        Ok(data) => Ok(Json(StreamResponse {
            success: true,
            data: Some(data),
            book_id,
            episode,
            error: None,
        })),
        Err(err @ (ContentError::NotFound(_) | ContentError::NoPlayableUrl { .. })) => {
            info!(endpoint = "stream", book_id = %book_id, episode, error = %err, "episode not playable");
            Err(ApiError::not_found(err.to_string()))
        }
        Err(err) => Ok(Json(StreamResponse {
            success: false,
            data: None,
            error: Some(err.to_string()),
            book_id,
            episode,
        })),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SessionRequest {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    success: bool,
    user: Claims,
}

/// Exchanges an identity token for the session cookie. The body is read by
/// hand so a missing or malformed body is a 401 like a missing token.
async fn create_session(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request: SessionRequest = serde_json::from_slice(&body).unwrap_or_default();
    let token = request
        .token
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("token is required"))?;

    let claims = state.verifier.verify(&token).await.map_err(|err| {
        warn!(endpoint = "auth/session", error = %err, "sign-in rejected");
        ApiError::unauthorized("invalid token")
    })?;

    info!(uid = %claims.uid, "session issued");
    let cookie = session_cookie(&token, state.cookie_secure);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            success: true,
            user: claims,
        }),
    )
        .into_response())
}

async fn logout() -> Response {
    (
        [(header::SET_COOKIE, cleared_session_cookie())],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response()
}
