//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CancelTransactionDto, GetBalanceDto, GetHistoryDto, GetMonthlyReportDto, HistoryRow,
    HistorySortKey, Money, MonthlyReportRow, RecognizeRevenueDto, ReplenishBalanceDto,
    ReserveMoneyDto,
};
use crate::error::AppError;
use crate::service::BalanceService;

use super::extract::{ApiPath, ApiQuery, JsonBody};

/// URL prefix under which exported report files are served
pub const FILES_PREFIX: &str = "/files";

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub amount: Money,
    pub service_id: i64,
    pub order_id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    pub amount: Money,
    pub service_id: i64,
    pub order_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub service_id: i64,
    pub order_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReplenishRequest {
    pub amount: Money,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: Money,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub offset: i64,
    /// 0 selects the configured page size
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub sort_by: HistorySortKey,
    #[serde(default)]
    pub reverse: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub report: Vec<MonthlyReportRow>,
    pub length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportFileResponse {
    /// Location on the server's filesystem
    pub path: String,
    /// Where the file can be downloaded
    pub url: String,
}

// =========================================================================
// Router
// =========================================================================

/// Create the versioned API router
pub fn create_router() -> Router<BalanceService> {
    Router::new()
        // Reservations
        .route("/v1/user/:user_id/reserve", post(reserve_money))
        .route("/v1/user/:user_id/recognize", post(recognize_revenue))
        .route("/v1/user/:user_id/cancel", post(cancel_transaction))
        // Balance
        .route(
            "/v1/user/:user_id/balance",
            get(get_balance).post(replenish_balance),
        )
        .route("/v1/user/:user_id/history", get(get_history))
        // Reports
        .route("/v1/report/:year/:month", get(get_monthly_report))
        .route("/v1/report/:year/:month/csv", get(export_monthly_report))
}

// =========================================================================
// POST /v1/user/:user_id/reserve
// =========================================================================

/// Hold money of a user for an order
async fn reserve_money(
    State(service): State<BalanceService>,
    ApiPath(user_id): ApiPath<i64>,
    JsonBody(request): JsonBody<ReserveRequest>,
) -> Result<StatusCode, AppError> {
    let mut dto = ReserveMoneyDto::new(user_id, request.amount, request.service_id, request.order_id);
    dto.description = request.description;
    dto.service_name = request.service_name;

    service.reserve_money(dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// POST /v1/user/:user_id/recognize
// =========================================================================

/// Book a reservation as revenue
async fn recognize_revenue(
    State(service): State<BalanceService>,
    ApiPath(user_id): ApiPath<i64>,
    JsonBody(request): JsonBody<RecognizeRequest>,
) -> Result<StatusCode, AppError> {
    let dto = RecognizeRevenueDto::new(user_id, request.amount, request.service_id, request.order_id);

    service.recognize_revenue(dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// POST /v1/user/:user_id/cancel
// =========================================================================

/// Return a reservation to the user's balance
async fn cancel_transaction(
    State(service): State<BalanceService>,
    ApiPath(user_id): ApiPath<i64>,
    JsonBody(request): JsonBody<CancelRequest>,
) -> Result<StatusCode, AppError> {
    let dto = CancelTransactionDto::new(user_id, request.service_id, request.order_id);

    service.cancel_transaction(dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET/POST /v1/user/:user_id/balance
// =========================================================================

async fn get_balance(
    State(service): State<BalanceService>,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = service.get_balance(GetBalanceDto::new(user_id)).await?;
    Ok(Json(BalanceResponse { balance }))
}

/// Credit a user; unknown users are created
async fn replenish_balance(
    State(service): State<BalanceService>,
    ApiPath(user_id): ApiPath<i64>,
    JsonBody(request): JsonBody<ReplenishRequest>,
) -> Result<StatusCode, AppError> {
    let mut dto = ReplenishBalanceDto::new(user_id, request.amount);
    dto.description = request.description;

    service.replenish_balance(dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET /v1/user/:user_id/history
// =========================================================================

async fn get_history(
    State(service): State<BalanceService>,
    ApiPath(user_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<Vec<HistoryRow>>, AppError> {
    let dto = GetHistoryDto::new(user_id)
        .with_page(query.offset, query.limit)
        .sorted_by(query.sort_by, query.reverse);

    let rows = service.get_history(dto).await?;
    Ok(Json(rows))
}

// =========================================================================
// GET /v1/report/:year/:month[/csv]
// =========================================================================

async fn get_monthly_report(
    State(service): State<BalanceService>,
    ApiPath((year, month)): ApiPath<(i32, i32)>,
) -> Result<Json<ReportResponse>, AppError> {
    let report = service
        .get_monthly_report(GetMonthlyReportDto::new(year, month))
        .await?;

    Ok(Json(ReportResponse {
        length: report.len(),
        report,
    }))
}

/// Write the report to the file directory and return its location
async fn export_monthly_report(
    State(service): State<BalanceService>,
    ApiPath((year, month)): ApiPath<(i32, i32)>,
) -> Result<Json<ReportFileResponse>, AppError> {
    let dto = GetMonthlyReportDto::new(year, month);
    let url = format!("{}/{}", FILES_PREFIX, dto.file_name());
    let path = service.export_monthly_report(dto).await?;

    Ok(Json(ReportFileResponse {
        path: path.display().to_string(),
        url,
    }))
}
