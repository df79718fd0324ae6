use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use prometheus::Encoder;

use crate::error::{Error, Result};
use crate::ip_source::IpListSnapshot;
use crate::metrics::REGISTRY;
use crate::orchestrator::{
    run_update, SelectedAccount, Trigger, UpdateRequest, UpdateResult, HISTORY_LIMIT,
};
use crate::store::{self, keys};
use crate::zero_trust::{Account, ZeroTrustApi};
use crate::App;

static INDEX_HTML: &str = include_str!("ui/index.html");

/// Wrapper applied to every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub version: &'static str,
}

impl Metadata {
    fn since(started: Instant) -> Self {
        Self {
            timestamp: Utc::now(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

fn ok<T: Serialize>(started: Instant, data: T) -> Response {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
        metadata: Metadata::since(started),
    })
    .into_response()
}

fn fail(started: Instant, err: &Error) -> Response {
    let body = Json(ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(err.to_string()),
        metadata: Metadata::since(started),
    });
    (status_for(err), body).into_response()
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::NoAccountSelected => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn api_info() -> Response {
    let started = Instant::now();
    ok(
        started,
        json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Synchronizes Zoom meeting IP ranges into zero trust split tunnel exclude lists",
            "endpoints": [
                "GET /status",
                "GET /accounts",
                "POST /accounts/select",
                "GET /accounts/selected",
                "GET /profiles",
                "POST /update",
                "GET /history",
                "POST /reset",
                "GET /metrics"
            ]
        }),
    )
}

#[derive(Debug, Serialize)]
struct ServiceStatus {
    last_update: Option<UpdateResult>,
    ip_count: usize,
    ip_list_fetched_at: Option<DateTime<Utc>>,
    selected_account: Option<SelectedAccount>,
    update_interval_hours: u64,
    next_scheduled: Option<DateTime<Utc>>,
}

async fn build_status(app: &App) -> Result<ServiceStatus> {
    let store = app.store.as_ref();
    let (snapshot, last_update, selected_account) = futures_util::join!(
        store::get_json::<IpListSnapshot>(store, keys::IP_LIST),
        store::get_json::<UpdateResult>(store, keys::LAST_RESULT),
        store::get_json::<SelectedAccount>(store, keys::SELECTED_ACCOUNT),
    );
    let (snapshot, last_update, selected_account) = (snapshot?, last_update?, selected_account?);

    let interval = chrono::Duration::from_std(app.config.update_interval)
        .unwrap_or_else(|_| chrono::Duration::hours(24));
    let next_scheduled = last_update.as_ref().map(|last| last.timestamp + interval);

    Ok(ServiceStatus {
        ip_count: snapshot.as_ref().map(|s| s.total_count).unwrap_or(0),
        ip_list_fetched_at: snapshot.map(|s| s.fetched_at),
        last_update,
        selected_account,
        update_interval_hours: app.config.update_interval.as_secs() / 3600,
        next_scheduled,
    })
}

async fn service_status(State(app): State<Arc<App>>) -> Response {
    let started = Instant::now();
    match build_status(&app).await {
        Ok(status) => ok(started, status),
        Err(err) => fail(started, &err),
    }
}

async fn list_accounts(State(app): State<Arc<App>>) -> Response {
    let started = Instant::now();
    match app.zero_trust.list_accounts().await {
        Ok(accounts) => ok(started, accounts),
        Err(err) => fail(started, &err),
    }
}

#[derive(Debug, Deserialize)]
struct SelectAccountRequest {
    account_id: String,
}

async fn do_select_account(app: &App, request: SelectAccountRequest) -> Result<Account> {
    let account_id = request.account_id.trim();
    if account_id.is_empty() {
        return Err(Error::validation("account_id must not be empty"));
    }

    let accounts = app.zero_trust.list_accounts().await?;
    let account = accounts
        .into_iter()
        .find(|a| a.id == account_id)
        .ok_or_else(|| Error::not_found(format!("account {account_id}")))?;

    store::put_json(
        app.store.as_ref(),
        keys::SELECTED_ACCOUNT,
        &SelectedAccount {
            id: account.id.clone(),
            name: Some(account.name.clone()),
        },
    )
    .await?;
    info!(account = %account.id, "selected target account");
    Ok(account)
}

async fn select_account(
    State(app): State<Arc<App>>,
    body: std::result::Result<Json<SelectAccountRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return fail(started, &Error::validation(rejection.body_text()));
        }
    };
    match do_select_account(&app, request).await {
        Ok(account) => ok(started, account),
        Err(err) => fail(started, &err),
    }
}

async fn selected_account(State(app): State<Arc<App>>) -> Response {
    let started = Instant::now();
    let selected =
        store::get_json::<SelectedAccount>(app.store.as_ref(), keys::SELECTED_ACCOUNT).await;
    match selected {
        Ok(Some(account)) => ok(started, account),
        Ok(None) => fail(started, &Error::not_found("no account selected")),
        Err(err) => fail(started, &err),
    }
}

async fn profiles_placeholder() -> Response {
    let started = Instant::now();
    ok(
        started,
        json!({
            "message": "Per-profile results are reported by /status and /history"
        }),
    )
}

async fn trigger_update(
    State(app): State<Arc<App>>,
    body: std::result::Result<Json<UpdateRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request = match body {
        Ok(Json(request)) => request,
        // an empty body means "update the selected account, no force"
        Err(JsonRejection::MissingJsonContentType(_)) => UpdateRequest::default(),
        Err(rejection) => {
            return fail(started, &Error::validation(rejection.body_text()));
        }
    };

    match run_update(&app, &request, Trigger::Manual).await {
        Ok(result) => Json(ApiResponse {
            success: result.success,
            data: Some(result),
            error: None,
            metadata: Metadata::since(started),
        })
        .into_response(),
        Err(err) => fail(started, &err),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn history(State(app): State<Arc<App>>, Query(params): Query<HistoryParams>) -> Response {
    let started = Instant::now();
    let history = store::get_json::<Vec<UpdateResult>>(app.store.as_ref(), keys::HISTORY).await;
    match history {
        Ok(entries) => {
            let mut entries = entries.unwrap_or_default();
            entries.truncate(params.limit.unwrap_or(HISTORY_LIMIT));
            ok(started, entries)
        }
        Err(err) => fail(started, &err),
    }
}

async fn reset(State(app): State<Arc<App>>) -> Response {
    let started = Instant::now();
    for key in keys::ALL {
        if let Err(err) = app.store.delete(key).await {
            return fail(started, &err);
        }
    }
    info!("cleared all persisted state");
    ok(started, json!({"message": "state cleared"}))
}

async fn prometheus_metrics() -> Response {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!(%err, "could not encode custom metrics");
    }
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(%err, "could not encode default metrics");
    }
    match String::from_utf8(buffer) {
        Ok(body) => body.into_response(),
        Err(err) => {
            error!(%err, "metrics were not valid utf8");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api", get(api_info))
        .route("/status", get(service_status))
        .route("/accounts", get(list_accounts))
        .route("/accounts/select", post(select_account))
        .route("/accounts/selected", get(selected_account))
        .route("/profiles", get(profiles_placeholder))
        .route("/update", post(trigger_update))
        .route("/history", get(history))
        .route("/reset", post(reset))
        .route("/metrics", get(prometheus_metrics))
        .layer(CorsLayer::permissive())
        .with_state(app)
}

pub async fn serve(app: Arc<App>, addr: SocketAddr) -> std::io::Result<()> {
    info!(%addr, "control surface listening");
    axum_server::bind(addr)
        .serve(router(app).into_make_service())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_documented_statuses() {
        assert_eq!(
            status_for(&Error::validation("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::NoAccountSelected),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::not_found("account x")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::api(Some(502), "upstream")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&Error::store("io")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let rendered = serde_json::to_value(ApiResponse {
            success: true,
            data: Some(42),
            error: None,
            metadata: Metadata::since(Instant::now()),
        })
        .unwrap();
        assert_eq!(rendered["success"], true);
        assert_eq!(rendered["data"], 42);
        assert!(rendered.get("error").is_none());
        assert!(rendered["metadata"]["version"].is_string());
    }
}
