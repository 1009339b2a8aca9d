// 🌐 HTTP API
// Read-only JSON endpoints over the stored labeled transactions

use crate::aggregation::{EntityKind, GroupBy};
use crate::db::get_all_labeled;
use crate::error::RiskError;
use crate::report::{Kpis, ReportFilter, ReportingFacade, SummaryTable};
use crate::transaction::{LabeledTransaction, RiskLabel};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::error;

const DEFAULT_TOP_LIMIT: usize = 10;
const DEFAULT_PAGE_SIZE: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub facade: ReportingFacade,
}

impl AppState {
    pub fn new(conn: Connection, facade: ReportingFacade) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            facade,
        }
    }

    fn load(&self, filter: &ReportFilter) -> Result<Vec<LabeledTransaction>, ApiError> {
        filter.validate()?;
        let conn = self
            .db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))?;
        let labeled = get_all_labeled(&conn).map_err(|e| {
            error!("Error loading transactions: {:#}", e);
            ApiError::Internal("failed to load transactions".to_string())
        })?;
        Ok(filter.apply(&labeled)?)
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<RiskError> for ApiError {
    fn from(err: RiskError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Query parameters
// ============================================================================

/// Shared filter parameters; list values are comma-separated
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub labels: Option<String>,
    pub sectors: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub dense: Option<bool>,
    pub label: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn split_list(value: &Option<String>) -> Vec<&str> {
    value
        .as_deref()
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

impl FilterParams {
    fn to_filter(&self) -> Result<ReportFilter, ApiError> {
        let labels = split_list(&self.labels)
            .into_iter()
            .map(|l| l.parse::<RiskLabel>().map_err(ApiError::BadRequest))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ReportFilter {
            labels,
            sectors: split_list(&self.sectors).into_iter().map(String::from).collect(),
            from: self.from,
            to: self.to,
        })
    }

    fn label(&self) -> Result<RiskLabel, ApiError> {
        match &self.label {
            Some(l) => l.parse().map_err(ApiError::BadRequest),
            None => Ok(RiskLabel::High),
        }
    }

    fn kind(&self) -> Result<EntityKind, ApiError> {
        match &self.kind {
            Some(k) => k.parse().map_err(ApiError::BadRequest),
            None => Ok(EntityKind::Customer),
        }
    }
}

/// Page of filtered transactions
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionPage {
    pub total: usize,
    pub offset: usize,
    pub items: Vec<LabeledTransaction>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/kpis
async fn get_kpis(State(state): State<AppState>, Query(params): Query<FilterParams>) -> ApiResult<Kpis> {
    let labeled = state.load(&params.to_filter()?)?;
    Ok(Json(ApiResponse::ok(state.facade.kpis(&labeled))))
}

/// GET /api/summary/:dimension
async fn get_summary(
    State(state): State<AppState>,
    Path(dimension): Path<String>,
    Query(params): Query<FilterParams>,
) -> ApiResult<SummaryTable> {
    let group_by: GroupBy = dimension.parse().map_err(ApiError::BadRequest)?;
    let labeled = state.load(&params.to_filter()?)?;

    let table = if params.dense.unwrap_or(false) {
        let mut config = state.facade.engine().config().clone();
        config.dense_buckets = true;
        ReportingFacade::new(crate::aggregation::AggregationEngine::new(config))
            .summary(&labeled, group_by)
    } else {
        state.facade.summary(&labeled, group_by)
    };
    Ok(Json(ApiResponse::ok(table)))
}

/// GET /api/top-entities?label=High&kind=customer&limit=10
async fn get_top_entities(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<SummaryTable> {
    let label = params.label()?;
    let kind = params.kind()?;
    let labeled = state.load(&params.to_filter()?)?;
    let limit = params.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    Ok(Json(ApiResponse::ok(state.facade.top_entities(&labeled, label, kind, limit))))
}

/// GET /api/matrix/:kind - entity × label counts
async fn get_matrix(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<FilterParams>,
) -> ApiResult<SummaryTable> {
    let kind: EntityKind = kind.parse().map_err(ApiError::BadRequest)?;
    let labeled = state.load(&params.to_filter()?)?;
    Ok(Json(ApiResponse::ok(state.facade.matrix(&labeled, kind))))
}

/// GET /api/transactions - filtered, paginated
async fn get_transactions(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<TransactionPage> {
    let labeled = state.load(&params.to_filter()?)?;
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    let total = labeled.len();
    let items = labeled.into_iter().skip(offset).take(limit).collect();
    Ok(Json(ApiResponse::ok(TransactionPage { total, offset, items })))
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/kpis", get(get_kpis))
        .route("/summary/:dimension", get(get_summary))
        .route("/top-entities", get(get_top_entities))
        .route("/matrix/:kind", get(get_matrix))
        .route("/transactions", get(get_transactions))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
