//! Commission Ledger API Library
//!
//! # Overview
//!
//! 추천 커미션 잔액 원장과 영업시간 기반 출금 처리 백엔드.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         API                              │
//! │                                                          │
//! │  ┌─────────┐  ┌──────────┐  ┌──────────┐  ┌─────────┐   │
//! │  │ Routes  │─►│ Services │─►│Repository│  │  Types  │   │
//! │  └─────────┘  └──────────┘  └────┬─────┘  └─────────┘   │
//! │                                  │                       │
//! └──────────────────────────────────┼───────────────────────┘
//!                                    ▼
//!                           ┌────────────────┐
//!                           │   PostgreSQL   │
//!                           └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 비즈니스 로직 (잔액 보안, 출금 스케줄러, 커미션)
//! - `db`: 데이터베이스 연동
//! - `types`: 공통 타입 정의
//!
//! ## Usage
//!
//! ```rust,ignore
//! use commission_ledger_api::{config::Config, db::Database, services::SystemClock, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let db = Database::connect(&config.database_url).await?;
//!     let state = AppState::new(config, Arc::new(db), Arc::new(SystemClock))?;
//!
//!     // ... 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Context;

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod db;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::ApiError;
pub use db::{Database, LedgerRepository};

use services::{
    BusinessHours, Clock, CommissionSchedule, CommissionSecurityManager, PlanCatalog,
    ReferralCommissionService, WithdrawalLimits, WithdrawalScheduler,
};

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn LedgerRepository>,
    pub ledger: Arc<CommissionSecurityManager>,
    pub withdrawals: Arc<WithdrawalScheduler>,
    pub commissions: Arc<ReferralCommissionService>,
    pub plans: Arc<PlanCatalog>,
    pub config: Arc<Config>,
}

impl AppState {
    /// 서비스 그래프 구성
    pub fn new(
        config: Config,
        repo: Arc<dyn LedgerRepository>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let hours = BusinessHours::from_config(&config).context("invalid business hours window")?;

        let ledger = Arc::new(CommissionSecurityManager::new(
            repo.clone(),
            &config.ledger_hash_secret,
            clock.clone(),
        ));
        let withdrawals = Arc::new(WithdrawalScheduler::new(
            repo.clone(),
            ledger.clone(),
            hours,
            clock,
            WithdrawalLimits::from_config(&config),
        ));
        let commissions = Arc::new(ReferralCommissionService::new(
            repo.clone(),
            ledger.clone(),
            CommissionSchedule::from_config(&config),
        ));
        let plans = Arc::new(PlanCatalog::new(repo.clone()));

        Ok(Self {
            repo,
            ledger,
            withdrawals,
            commissions,
            plans,
            config: Arc::new(config),
        })
    }
}
