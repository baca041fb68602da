//! Health Check Endpoint
//!
//! # Interview Q&A
//!
//! Q: 헬스체크에서 DB 를 ping 하는 이유는?
//! A: 원장 서비스는 DB 없이는 아무 요청도 처리할 수 없음
//!    - 프로세스만 살아있으면 "degraded" 로 보고
//!    - 로드밸런서가 트래픽을 다른 인스턴스로 돌릴 수 있음
//!
//! Q: 영업시간 상태는 왜 포함하는가?
//! A: 운영자가 출금 처리 가능 여부를 대시보드에서 바로 확인

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// Health check 응답
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: DatabaseStatus,
    pub business_hours_active: bool,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct DatabaseStatus {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// GET /health
///
/// 서버 및 의존성 상태 확인 (DB ping + 영업시간 상태)
pub async fn health_check(
    State(state): State<AppState>,
) -> Json<HealthResponse> {
    // DB 연결 테스트
    let db_start = std::time::Instant::now();
    let db_status = match state.repo.health_check().await {
        Ok(_) => DatabaseStatus {
            connected: true,
            latency_ms: Some(db_start.elapsed().as_millis() as u64),
        },
        Err(_) => DatabaseStatus {
            connected: false,
            latency_ms: None,
        },
    };

    Json(HealthResponse {
        status: if db_status.connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
        business_hours_active: state.withdrawals.is_within_business_hours(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
