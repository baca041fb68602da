//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어
//!
//! # Services
//! - `CommissionSecurityManager`: 잔액 읽기/쓰기, 무결성 검증, 감사 로그
//! - `WithdrawalScheduler`: 출금 신청 및 영업시간 기반 관리자 처리
//! - `ReferralCommissionService`: 3단계 추천 커미션 기록/활성화
//! - `PlanCatalog`: 투자 플랜 목록 및 중복 정리

pub mod business_hours;
pub mod commission_security;
pub mod integrity;
pub mod plan_catalog;
pub mod referral_commission;
pub mod withdrawal_scheduler;

pub use business_hours::{BusinessHours, Clock, FixedClock, SystemClock};
pub use commission_security::{BalanceUpdate, CommissionSecurityManager};
pub use integrity::IntegrityReport;
pub use plan_catalog::{CleanupReport, PlanCatalog};
pub use referral_commission::{CommissionSchedule, CommissionSummary, ReferralCommissionService};
pub use withdrawal_scheduler::{ProcessCommand, WithdrawalLimits, WithdrawalScheduler};
