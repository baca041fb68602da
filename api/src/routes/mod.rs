//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                        - 서버 상태 확인
//!
//! (X-User-Id)
//! GET  /api/referrals/commission-balance              - 검증된 잔액
//! GET  /api/referrals/transactions                    - 잔액 변경 내역
//! GET  /api/referrals/commissions                     - 커미션 목록/합계
//! POST /api/referrals/payout                          - 출금 신청
//! GET  /api/referrals/withdrawals                     - 내 출금 목록
//!
//! (Bearer ADMIN_API_TOKEN + X-Admin-Id)
//! GET  /api/admin/secure-withdrawals                  - 출금 대기열
//! POST /api/admin/secure-withdrawals/:id/process      - 완료/실패 처리
//! POST /api/admin/commissions                         - 투자 커미션 기록
//! POST /api/admin/commissions/activate                - pending → paid
//! POST /api/admin/commissions/:investment_id/cancel   - pending → cancelled
//! POST /api/admin/referrals                           - 추천인 등록
//! GET  /api/admin/balances/:user_id/integrity         - 무결성 리포트
//! PUT  /api/admin/balances/:user_id                   - 잔액 조정
//! POST /api/admin/balances/:user_id/recompute         - 커미션 기준 재계산
//! GET  /api/admin/security-events                     - 감사 로그
//! GET  /api/admin/plans                               - 플랜 목록
//! POST /api/admin/plans                               - 플랜 생성
//! POST /api/admin/plans/cleanup-duplicates            - 중복 플랜 정리
//! ```

pub mod admin;
pub mod auth;
pub mod health;
pub mod referral;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// 라우터 생성
pub fn create_router(state: AppState) -> Router {
    // CORS: 설정된 origin 만 허용
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(auth::USER_ID_HEADER),
            HeaderName::from_static(auth::ADMIN_ID_HEADER),
        ]);

    let user_routes = Router::new()
        .route("/commission-balance", get(referral::get_commission_balance))
        .route("/transactions", get(referral::get_transactions))
        .route("/commissions", get(referral::get_commissions))
        .route("/payout", post(referral::submit_payout))
        .route("/withdrawals", get(referral::get_withdrawals))
        .route_layer(middleware::from_fn(auth::require_user));

    let admin_routes = Router::new()
        // Withdrawals
        .route("/secure-withdrawals", get(admin::list_pending_withdrawals))
        .route("/secure-withdrawals/:id/process", post(admin::process_withdrawal))

        // Commissions & referrals
        .route("/commissions", post(admin::record_commissions))
        .route("/commissions/activate", post(admin::activate_commissions))
        .route("/commissions/:investment_id/cancel", post(admin::cancel_commissions))
        .route("/referrals", post(admin::link_referral))

        // Balances
        .route("/balances/:user_id", put(admin::adjust_balance))
        .route("/balances/:user_id/integrity", get(admin::balance_integrity))
        .route("/balances/:user_id/recompute", post(admin::recompute_balance))
        .route("/security-events", get(admin::security_events))

        // Plans
        .route("/plans", get(admin::list_plans).post(admin::create_plan))
        .route("/plans/cleanup-duplicates", post(admin::cleanup_duplicate_plans))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .nest("/api/referrals", user_routes)
        .nest("/api/admin", admin_routes)

        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)

        // 상태 주입
        .with_state(state)
}
