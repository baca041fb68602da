//! User Referral Endpoints
//!
//! 로그인 사용자 본인의 커미션 잔액, 거래 내역, 출금 신청.
//! 모든 핸들러는 `require_user` 미들웨어 뒤에서 실행됨.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    db::{
        CommissionTotals, PendingTotals, TransactionLogEntry, UserBalance, WithdrawalRequest,
        WithdrawalType,
    },
    error::ApiError,
    routes::auth::CurrentUser,
    services::{withdrawal_scheduler::SubmissionResult, CommissionSummary},
    types::{ApiResponse, PageQuery, Pagination},
    AppState,
};

// ============ Request/Response Types ============

/// 잔액 조회 응답
#[derive(Debug, Serialize)]
pub struct CommissionBalanceResponse {
    pub balance: UserBalance,
    /// 조회 성공 == 무결성 통과 (실패 시 409)
    pub integrity_verified: bool,
    pub pending_withdrawals: PendingTotals,
    pub commissions: CommissionTotals,
    pub business_hours_active: bool,
    pub next_business_day: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionLogEntry>,
    pub pagination: Pagination,
}

/// 출금 신청 요청
#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub withdrawal_type: WithdrawalType,
    #[serde(default)]
    pub usdt_amount: Option<Decimal>,
    #[serde(default)]
    pub nft_quantity: Option<i64>,
    pub wallet_address: String,
}

// ============ Handlers ============

/// GET /api/referrals/commission-balance
pub async fn get_commission_balance(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<CommissionBalanceResponse>>, ApiError> {
    let balance = state.ledger.get_secure_user_balance(user_id).await?;
    let pending_withdrawals = state.repo.pending_withdrawal_totals(Some(user_id)).await?;
    let commissions = state.repo.commission_totals(user_id).await?;

    Ok(Json(ApiResponse::success(CommissionBalanceResponse {
        balance,
        integrity_verified: true,
        pending_withdrawals,
        commissions,
        business_hours_active: state.withdrawals.is_within_business_hours(),
        next_business_day: state.withdrawals.get_next_business_day(),
    })))
}

/// GET /api/referrals/transactions?page=0&limit=20
pub async fn get_transactions(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<TransactionsResponse>>, ApiError> {
    let (page, limit) = query.resolve();
    let (transactions, total) = state.ledger.transaction_history(user_id, page, limit).await?;

    Ok(Json(ApiResponse::success(TransactionsResponse {
        transactions,
        pagination: Pagination::new(page, limit, total),
    })))
}

/// GET /api/referrals/commissions
pub async fn get_commissions(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<CommissionSummary>>, ApiError> {
    let summary = state.commissions.commission_summary(user_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// POST /api/referrals/payout
///
/// 즉시 처리되지 않음. 관리자 대기열에 pending 으로 등록.
///
/// ```json
/// { "withdrawal_type": "usdt", "usdt_amount": "25.5", "wallet_address": "0x..." }
/// ```
pub async fn submit_payout(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<PayoutRequest>,
) -> Result<Json<ApiResponse<SubmissionResult>>, ApiError> {
    let result = state
        .withdrawals
        .submit_withdrawal_request(
            user_id,
            req.withdrawal_type,
            req.usdt_amount.unwrap_or(Decimal::ZERO),
            req.nft_quantity.unwrap_or(0),
            &req.wallet_address,
        )
        .await?;

    let message = result.message.clone();
    Ok(Json(ApiResponse::with_message(result, message)))
}

/// GET /api/referrals/withdrawals
pub async fn get_withdrawals(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<WithdrawalRequest>>>, ApiError> {
    let withdrawals = state.withdrawals.user_withdrawals(user_id).await?;
    Ok(Json(ApiResponse::success(withdrawals)))
}
