//! Commission Security Manager
//!
//! 사용자별 커미션 잔액의 유일한 쓰기 경로.
//!
//! # Flow
//!
//! ```text
//! update_user_balance
//!   1. 불변식 검증 (음수 금지, available = earned - withdrawn)
//!   2. primary / verification 교차 검증 (해시 포함)
//!   3. version + 1 로 두 해시 재계산
//!   4. repository.write_balance → primary + mirror + log (한 트랜잭션)
//! ```

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::{
    db::{
        AdminId, BalanceAmounts, BalanceWrite, LedgerRepository, NewSecurityEvent,
        SecurityAuditLogEntry, Severity, TransactionLogEntry, TransactionType, UserBalance, UserId,
    },
    error::ApiError,
    services::{
        business_hours::Clock,
        integrity::{IntegrityHasher, IntegrityReport},
    },
    types::{exceeds_usdt_scale, USDT_SCALE},
};

/// 잔액 덮어쓰기 요청
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceUpdate {
    pub user_id: UserId,
    pub amounts: BalanceAmounts,
    pub reference_id: Option<String>,
    pub admin_id: Option<AdminId>,
    pub transaction_type: TransactionType,
    /// 무결성 검사 실패 상태의 잔액을 관리자가 재봉인 (critical 감사 이벤트 기록)
    #[serde(default)]
    pub override_integrity: bool,
}

pub struct CommissionSecurityManager {
    repo: Arc<dyn LedgerRepository>,
    hasher: IntegrityHasher,
    clock: Arc<dyn Clock>,
}

impl CommissionSecurityManager {
    pub fn new(repo: Arc<dyn LedgerRepository>, hash_secret: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            hasher: IntegrityHasher::new(hash_secret),
            clock,
        }
    }

    /// 검증된 잔액 조회
    ///
    /// 행이 없으면 0 잔액 (version 0). 교차 검증 실패 시 IntegrityViolation.
    pub async fn get_secure_user_balance(&self, user_id: UserId) -> Result<UserBalance, ApiError> {
        let (balance, failures) = self.load_checked(user_id).await?;
        if !failures.is_empty() {
            return Err(ApiError::IntegrityViolation(user_id));
        }
        Ok(balance)
    }

    pub async fn verify_balance_integrity(&self, user_id: UserId) -> Result<bool, ApiError> {
        let (_, failures) = self.load_checked(user_id).await?;
        Ok(failures.is_empty())
    }

    pub async fn integrity_report(&self, user_id: UserId) -> Result<IntegrityReport, ApiError> {
        let (balance, failures) = self.load_checked(user_id).await?;
        Ok(IntegrityReport {
            user_id,
            valid: failures.is_empty(),
            version: balance.version,
            failures,
            checked_at: self.clock.now(),
        })
    }

    /// primary 행 + 실패 항목. 실패가 있으면 감사 로그 기록
    async fn load_checked(&self, user_id: UserId) -> Result<(UserBalance, Vec<String>), ApiError> {
        let primary = self.repo.find_balance(user_id).await?;
        let mirror = self.repo.find_verification(user_id).await?;
        let failures = self.hasher.check(user_id, primary.as_ref(), mirror.as_ref());

        if !failures.is_empty() {
            tracing::error!(user_id, ?failures, "Balance integrity check failed");
            self.record_event(NewSecurityEvent {
                event_type: "balance_integrity_failure",
                severity: Severity::Critical,
                user_id: Some(user_id),
                admin_id: None,
                details: json!({ "failures": failures }),
            })
            .await;
        }

        Ok((primary.unwrap_or_else(|| UserBalance::empty(user_id)), failures))
    }

    /// 잔액 덮어쓰기 (primary + verification + log)
    pub async fn update_user_balance(&self, update: BalanceUpdate) -> Result<UserBalance, ApiError> {
        validate_amounts(&update.amounts)?;

        let (current, failures) = self.load_checked(update.user_id).await?;
        if !failures.is_empty() {
            if !update.override_integrity {
                return Err(ApiError::IntegrityViolation(update.user_id));
            }
            tracing::warn!(user_id = update.user_id, admin_id = ?update.admin_id, "Resealing balance after integrity failure");
            self.record_event(NewSecurityEvent {
                event_type: "balance_resealed",
                severity: Severity::Critical,
                user_id: Some(update.user_id),
                admin_id: update.admin_id,
                details: json!({
                    "failures": failures,
                    "previous_version": current.version,
                }),
            })
            .await;
        }

        let write = self.seal(
            &current,
            update.amounts,
            update.transaction_type,
            update.reference_id,
            update.admin_id,
        );
        let balance = self.repo.write_balance(write).await?;

        tracing::info!(
            user_id = balance.user_id,
            version = balance.version,
            available_usdt = %balance.available_usdt_balance,
            available_nft = balance.available_nft_balance,
            transaction_type = update.transaction_type.as_str(),
            "Balance updated"
        );
        Ok(balance)
    }

    /// 현재 행 기준 다음 version 의 쓰기 명령 생성 (해시 포함)
    pub(crate) fn seal(
        &self,
        current: &UserBalance,
        amounts: BalanceAmounts,
        transaction_type: TransactionType,
        reference_id: Option<String>,
        admin_id: Option<AdminId>,
    ) -> BalanceWrite {
        let version = current.version + 1;
        BalanceWrite {
            user_id: current.user_id,
            amounts,
            expected_version: current.version,
            balance_hash: self.hasher.balance_hash(current.user_id, &amounts, version),
            verification_hash: self.hasher.verification_hash(current.user_id, &amounts, version),
            transaction_type,
            reference_id,
            admin_id,
        }
    }

    pub async fn transaction_history(
        &self,
        user_id: UserId,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<TransactionLogEntry>, i64), ApiError> {
        Ok(self.repo.list_transactions(user_id, page, limit).await?)
    }

    pub async fn security_events(&self, limit: u32) -> Result<Vec<SecurityAuditLogEntry>, ApiError> {
        Ok(self.repo.recent_security_events(limit).await?)
    }

    /// 감사 로그 기록 실패는 원래 작업을 막지 않음
    pub(crate) async fn record_event(&self, event: NewSecurityEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.repo.record_security_event(event).await {
            tracing::error!(event_type, "Failed to record security event: {}", e);
        }
    }
}

/// 음수 금지 + 소수 6자리 이내 + available = earned − withdrawn
pub fn validate_amounts(amounts: &BalanceAmounts) -> Result<(), ApiError> {
    if amounts.has_negative() {
        return Err(ApiError::ValidationError("balance amounts must not be negative".to_string()));
    }
    // 저장 시 반올림되면 봉인된 해시와 어긋남
    let usdt = [
        amounts.total_usdt_earned,
        amounts.available_usdt,
        amounts.total_usdt_withdrawn,
    ];
    if usdt.into_iter().any(exceeds_usdt_scale) {
        return Err(ApiError::ValidationError(format!(
            "USDT amounts support at most {} decimal places",
            USDT_SCALE
        )));
    }
    if !amounts.is_consistent() {
        return Err(ApiError::ValidationError(
            "available balance must equal total earned minus total withdrawn".to_string(),
        ));
    }
    Ok(())
}
