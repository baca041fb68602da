//! Admin Endpoints
//!
//! # Interview Q&A
//!
//! Q: 관리자 출금 처리에서 가장 중요한 보장은?
//! A: "완료 = 잔액 차감" 이 원자적이어야 함
//!    - 상태 변경과 차감이 한 트랜잭션 (둘 중 하나만 반영되는 일 없음)
//!    - 처리 시점 잔액 재검사 → 잔액 부족이면 완료 불가
//!    - 영업시간 외 완료 요청은 423 으로 거부
//!
//! Q: 관리자 id 는 어디서 오는가?
//! A: `require_admin` 미들웨어가 토큰 검증 후 `X-Admin-Id` 를 extension 으로 주입

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::{
        ActivationScope, BalanceAmounts, InvestmentPlan, SecurityAuditLogEntry, TransactionType,
        UserBalance, UserId, WithdrawalRequest, WithdrawalStatus,
    },
    error::ApiError,
    routes::auth::CurrentAdmin,
    services::{
        referral_commission::{ActivationResult, RecordedCommissions},
        withdrawal_scheduler::AdminQueue,
        BalanceUpdate, CleanupReport, IntegrityReport, ProcessCommand,
    },
    types::ApiResponse,
    AppState,
};

// ============ Request Types ============

#[derive(Debug, Deserialize)]
pub struct ProcessWithdrawalRequest {
    pub status: WithdrawalStatus,
    pub transaction_hash: Option<String>,
    pub blockchain_hash: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordCommissionsRequest {
    pub investment_id: String,
    pub investor_id: UserId,
    pub amount: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivateCommissionsRequest {
    /// 없으면 전체 pending 활성화
    pub investment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkReferralRequest {
    pub user_id: UserId,
    pub referrer_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    pub amounts: BalanceAmounts,
    pub reference_id: Option<String>,
    #[serde(default)]
    pub override_integrity: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub price_usdt: Decimal,
    pub shares: i64,
}

// ============ Withdrawals ============

/// GET /api/admin/secure-withdrawals
pub async fn list_pending_withdrawals(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AdminQueue>>, ApiError> {
    let queue = state.withdrawals.get_pending_withdrawals_for_admin().await?;
    Ok(Json(ApiResponse::success(queue)))
}

/// POST /api/admin/secure-withdrawals/:id/process
///
/// ```json
/// { "status": "completed", "transaction_hash": "0x...", "admin_notes": "paid" }
/// ```
pub async fn process_withdrawal(
    State(state): State<AppState>,
    Extension(CurrentAdmin(admin_id)): Extension<CurrentAdmin>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProcessWithdrawalRequest>,
) -> Result<Json<ApiResponse<WithdrawalRequest>>, ApiError> {
    let processed = state
        .withdrawals
        .admin_process_withdrawal(ProcessCommand {
            withdrawal_id: id,
            admin_id,
            new_status: req.status,
            transaction_hash: req.transaction_hash,
            blockchain_hash: req.blockchain_hash,
            notes: req.admin_notes,
        })
        .await?;

    let message = format!("Withdrawal marked {}", processed.status);
    Ok(Json(ApiResponse::with_message(processed, message)))
}

// ============ Commissions ============

/// POST /api/admin/commissions
pub async fn record_commissions(
    State(state): State<AppState>,
    Json(req): Json<RecordCommissionsRequest>,
) -> Result<Json<ApiResponse<RecordedCommissions>>, ApiError> {
    let recorded = state
        .commissions
        .record_investment_commissions(&req.investment_id, req.investor_id, req.amount)
        .await?;
    Ok(Json(ApiResponse::success(recorded)))
}

/// POST /api/admin/commissions/activate
pub async fn activate_commissions(
    State(state): State<AppState>,
    Extension(CurrentAdmin(admin_id)): Extension<CurrentAdmin>,
    body: Option<Json<ActivateCommissionsRequest>>,
) -> Result<Json<ApiResponse<ActivationResult>>, ApiError> {
    let scope = match body.and_then(|Json(req)| req.investment_id) {
        Some(id) => ActivationScope::Investment(id),
        None => ActivationScope::All,
    };
    let result = state
        .commissions
        .activate_pending_commissions(scope, Some(admin_id))
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// POST /api/admin/commissions/:investment_id/cancel
pub async fn cancel_commissions(
    State(state): State<AppState>,
    Path(investment_id): Path<String>,
) -> Result<Json<ApiResponse<u64>>, ApiError> {
    let cancelled = state
        .commissions
        .cancel_investment_commissions(&investment_id)
        .await?;
    Ok(Json(ApiResponse::with_message(
        cancelled,
        format!("{} pending commissions cancelled", cancelled),
    )))
}

/// POST /api/admin/referrals
pub async fn link_referral(
    State(state): State<AppState>,
    Json(req): Json<LinkReferralRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.commissions.link_referral(req.user_id, req.referrer_id).await?;
    Ok(Json(ApiResponse::with_message((), "Referral linked")))
}

// ============ Balances ============

/// GET /api/admin/balances/:user_id/integrity
pub async fn balance_integrity(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ApiResponse<IntegrityReport>>, ApiError> {
    let report = state.ledger.integrity_report(user_id).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// PUT /api/admin/balances/:user_id
pub async fn adjust_balance(
    State(state): State<AppState>,
    Extension(CurrentAdmin(admin_id)): Extension<CurrentAdmin>,
    Path(user_id): Path<UserId>,
    Json(req): Json<AdjustBalanceRequest>,
) -> Result<Json<ApiResponse<UserBalance>>, ApiError> {
    let balance = state
        .ledger
        .update_user_balance(BalanceUpdate {
            user_id,
            amounts: req.amounts,
            reference_id: req.reference_id,
            admin_id: Some(admin_id),
            transaction_type: TransactionType::BalanceAdjustment,
            override_integrity: req.override_integrity,
        })
        .await?;
    Ok(Json(ApiResponse::success(balance)))
}

/// POST /api/admin/balances/:user_id/recompute
pub async fn recompute_balance(
    State(state): State<AppState>,
    Extension(CurrentAdmin(admin_id)): Extension<CurrentAdmin>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ApiResponse<UserBalance>>, ApiError> {
    let balance = state
        .commissions
        .recompute_user_balance(user_id, Some(admin_id))
        .await?;
    Ok(Json(ApiResponse::success(balance)))
}

/// GET /api/admin/security-events?limit=50
pub async fn security_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<ApiResponse<Vec<SecurityAuditLogEntry>>>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let events = state.ledger.security_events(limit).await?;
    Ok(Json(ApiResponse::success(events)))
}

// ============ Plans ============

/// GET /api/admin/plans
pub async fn list_plans(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<InvestmentPlan>>>, ApiError> {
    Ok(Json(ApiResponse::success(state.plans.list_plans().await?)))
}

/// POST /api/admin/plans
pub async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<Json<ApiResponse<InvestmentPlan>>, ApiError> {
    let plan = state
        .plans
        .create_plan(&req.name, req.price_usdt, req.shares)
        .await?;
    Ok(Json(ApiResponse::success(plan)))
}

/// POST /api/admin/plans/cleanup-duplicates
pub async fn cleanup_duplicate_plans(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CleanupReport>>, ApiError> {
    let report = state.plans.cleanup_duplicate_plans().await?;
    Ok(Json(ApiResponse::success(report)))
}
