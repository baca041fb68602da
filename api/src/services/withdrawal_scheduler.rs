//! Withdrawal Scheduler
//!
//! # State Machine
//!
//! ```text
//!            submit                 admin (business hours)
//!   user ──────────► pending ──────────────────────────► completed
//!                       │                                   (balance decremented
//!                       │ admin (any time)                   in the same db transaction)
//!                       └──────────────────────────────────► failed
//! ```
//!
//! 신청은 절대 즉시 처리되지 않는다. 영업일 마감 전 신청은 당일,
//! 그 외는 다음 영업일이 `scheduled_for_date` 가 된다.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{
        AdminId, LedgerRepository, NewSecurityEvent, NewWithdrawal, PendingTotals, Severity,
        TransactionType, UserId, WithdrawalFilter, WithdrawalFinalization, WithdrawalRequest,
        WithdrawalStatus, WithdrawalType,
    },
    error::ApiError,
    services::{
        business_hours::{BusinessHours, Clock},
        commission_security::CommissionSecurityManager,
    },
    types::WalletAddress,
};

/// 최소 출금 단위
#[derive(Debug, Clone, Copy)]
pub struct WithdrawalLimits {
    pub min_usdt: Decimal,
    pub min_nft: i64,
}

impl WithdrawalLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_usdt: config.min_usdt_withdrawal,
            min_nft: config.min_nft_withdrawal,
        }
    }
}

/// 출금 신청 결과
#[derive(Debug, Serialize)]
pub struct SubmissionResult {
    pub withdrawal: WithdrawalRequest,
    pub scheduled_for_date: NaiveDate,
    pub business_hours_active: bool,
    /// 항상 false: 관리자 처리 대기열로만 들어감
    pub processed_immediately: bool,
    pub message: String,
}

/// 관리자 대기열
#[derive(Debug, Serialize)]
pub struct AdminQueue {
    pub withdrawals: Vec<WithdrawalRequest>,
    pub count: usize,
    pub pending_totals: PendingTotals,
    pub business_hours_active: bool,
    pub next_business_day: NaiveDate,
    pub next_opening: DateTime<Utc>,
}

/// 관리자 처리 명령
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub withdrawal_id: Uuid,
    pub admin_id: AdminId,
    pub new_status: WithdrawalStatus,
    pub transaction_hash: Option<String>,
    pub blockchain_hash: Option<String>,
    pub notes: Option<String>,
}

pub struct WithdrawalScheduler {
    repo: Arc<dyn LedgerRepository>,
    ledger: Arc<CommissionSecurityManager>,
    hours: BusinessHours,
    clock: Arc<dyn Clock>,
    limits: WithdrawalLimits,
}

impl WithdrawalScheduler {
    pub fn new(
        repo: Arc<dyn LedgerRepository>,
        ledger: Arc<CommissionSecurityManager>,
        hours: BusinessHours,
        clock: Arc<dyn Clock>,
        limits: WithdrawalLimits,
    ) -> Self {
        Self {
            repo,
            ledger,
            hours,
            clock,
            limits,
        }
    }

    pub fn is_within_business_hours(&self) -> bool {
        self.hours.is_open_at(self.clock.now())
    }

    pub fn get_next_business_day(&self) -> NaiveDate {
        self.hours.next_business_day(self.clock.now())
    }

    /// 출금 신청
    pub async fn submit_withdrawal_request(
        &self,
        user_id: UserId,
        withdrawal_type: WithdrawalType,
        usdt_amount: Decimal,
        nft_quantity: i64,
        wallet_address: &str,
    ) -> Result<SubmissionResult, ApiError> {
        self.validate_amounts(withdrawal_type, usdt_amount, nft_quantity)?;
        let wallet = WalletAddress::new(wallet_address).map_err(ApiError::ValidationError)?;

        // 무결성 실패 잔액에서는 출금 불가
        let balance = self.ledger.get_secure_user_balance(user_id).await?;
        let pending = self.repo.pending_withdrawal_totals(Some(user_id)).await?;

        match withdrawal_type {
            WithdrawalType::Usdt => {
                let free = balance.available_usdt_balance - pending.usdt;
                if free < usdt_amount {
                    return Err(ApiError::InsufficientBalance(format!(
                        "available {} USDT (pending {}), requested {}",
                        balance.available_usdt_balance, pending.usdt, usdt_amount
                    )));
                }
            }
            WithdrawalType::Nft => {
                let free = balance.available_nft_balance - pending.nft;
                if free < nft_quantity {
                    return Err(ApiError::InsufficientBalance(format!(
                        "available {} NFT (pending {}), requested {}",
                        balance.available_nft_balance, pending.nft, nft_quantity
                    )));
                }
            }
        }

        let now = self.clock.now();
        let scheduled_for_date = self.hours.processing_date(now);
        let business_hours_active = self.hours.is_open_at(now);

        // 잔액 재검사는 insert 와 같은 트랜잭션에서 한 번 더 (동시 신청 방지)
        let withdrawal = self
            .repo
            .insert_withdrawal(NewWithdrawal {
                user_id,
                withdrawal_type,
                requested_amount_usdt: usdt_amount,
                requested_quantity_nft: nft_quantity,
                wallet_address: wallet.into_inner(),
                scheduled_for_date,
            })
            .await?;

        tracing::info!(
            withdrawal_id = %withdrawal.id,
            user_id,
            withdrawal_type = withdrawal_type.as_str(),
            %usdt_amount,
            nft_quantity,
            %scheduled_for_date,
            "Withdrawal request submitted"
        );
        self.ledger
            .record_event(NewSecurityEvent {
                event_type: "withdrawal_submitted",
                severity: Severity::Info,
                user_id: Some(user_id),
                admin_id: None,
                details: json!({
                    "withdrawal_id": withdrawal.id,
                    "type": withdrawal_type.as_str(),
                    "usdt_amount": usdt_amount,
                    "nft_quantity": nft_quantity,
                }),
            })
            .await;

        let message = if business_hours_active {
            "Withdrawal request queued for processing today".to_string()
        } else {
            format!(
                "Submitted outside business hours, scheduled for {}",
                scheduled_for_date
            )
        };

        Ok(SubmissionResult {
            withdrawal,
            scheduled_for_date,
            business_hours_active,
            processed_immediately: false,
            message,
        })
    }

    fn validate_amounts(
        &self,
        withdrawal_type: WithdrawalType,
        usdt_amount: Decimal,
        nft_quantity: i64,
    ) -> Result<(), ApiError> {
        match withdrawal_type {
            WithdrawalType::Usdt => {
                if nft_quantity != 0 {
                    return Err(ApiError::ValidationError(
                        "USDT withdrawal must not include NFT quantity".to_string(),
                    ));
                }
                if usdt_amount < self.limits.min_usdt {
                    return Err(ApiError::ValidationError(format!(
                        "minimum USDT withdrawal is {}",
                        self.limits.min_usdt
                    )));
                }
                if crate::types::exceeds_usdt_scale(usdt_amount) {
                    return Err(ApiError::ValidationError(
                        "USDT amount has too many decimal places".to_string(),
                    ));
                }
            }
            WithdrawalType::Nft => {
                if !usdt_amount.is_zero() {
                    return Err(ApiError::ValidationError(
                        "NFT withdrawal must not include USDT amount".to_string(),
                    ));
                }
                if nft_quantity < self.limits.min_nft {
                    return Err(ApiError::ValidationError(format!(
                        "minimum NFT withdrawal is {}",
                        self.limits.min_nft
                    )));
                }
            }
        }
        Ok(())
    }

    /// 관리자 대기열 (오래된 순)
    pub async fn get_pending_withdrawals_for_admin(&self) -> Result<AdminQueue, ApiError> {
        let withdrawals = self
            .repo
            .list_withdrawals(
                WithdrawalFilter {
                    user_id: None,
                    status: Some(WithdrawalStatus::Pending),
                },
                true,
            )
            .await?;
        let pending_totals = self.repo.pending_withdrawal_totals(None).await?;
        let now = self.clock.now();

        Ok(AdminQueue {
            count: withdrawals.len(),
            withdrawals,
            pending_totals,
            business_hours_active: self.hours.is_open_at(now),
            next_business_day: self.hours.next_business_day(now),
            next_opening: self.hours.next_opening(now),
        })
    }

    /// 사용자 본인 출금 목록 (최신 순)
    pub async fn user_withdrawals(&self, user_id: UserId) -> Result<Vec<WithdrawalRequest>, ApiError> {
        Ok(self
            .repo
            .list_withdrawals(
                WithdrawalFilter {
                    user_id: Some(user_id),
                    status: None,
                },
                false,
            )
            .await?)
    }

    /// 관리자 처리: pending → completed | failed
    ///
    /// completed 는 영업시간에만, 처리 시점 잔액이 충분할 때만 가능.
    /// 상태 변경과 잔액 차감은 하나의 트랜잭션.
    pub async fn admin_process_withdrawal(
        &self,
        cmd: ProcessCommand,
    ) -> Result<WithdrawalRequest, ApiError> {
        if cmd.new_status == WithdrawalStatus::Pending {
            return Err(ApiError::ValidationError(
                "new status must be completed or failed".to_string(),
            ));
        }

        let request = self
            .repo
            .find_withdrawal(cmd.withdrawal_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Withdrawal".to_string()))?;
        if request.status.is_terminal() {
            return Err(ApiError::InvalidState(format!(
                "withdrawal is already {}",
                request.status
            )));
        }

        let now = self.clock.now();
        let balance_write = match cmd.new_status {
            WithdrawalStatus::Completed => {
                let tx_hash = cmd.transaction_hash.as_deref().unwrap_or_default();
                if !is_valid_tx_hash(tx_hash) {
                    return Err(ApiError::ValidationError(
                        "completed withdrawal requires a valid transaction hash".to_string(),
                    ));
                }
                if let Some(hash) = cmd.blockchain_hash.as_deref() {
                    if !is_valid_tx_hash(hash) {
                        return Err(ApiError::ValidationError(
                            "invalid blockchain confirmation hash".to_string(),
                        ));
                    }
                }
                if !self.hours.is_open_at(now) {
                    // 평일 개장 전이면 오늘
                    return Err(ApiError::OutsideBusinessHours {
                        next_business_day: self.hours.processing_date(now),
                    });
                }

                let balance = self.ledger.get_secure_user_balance(request.user_id).await?;
                let mut amounts = balance.amounts();
                match request.withdrawal_type {
                    WithdrawalType::Usdt => {
                        if amounts.available_usdt < request.requested_amount_usdt {
                            return Err(ApiError::InsufficientBalance(format!(
                                "available {} USDT, requested {}",
                                amounts.available_usdt, request.requested_amount_usdt
                            )));
                        }
                        amounts.available_usdt -= request.requested_amount_usdt;
                        amounts.total_usdt_withdrawn += request.requested_amount_usdt;
                    }
                    WithdrawalType::Nft => {
                        if amounts.available_nft < request.requested_quantity_nft {
                            return Err(ApiError::InsufficientBalance(format!(
                                "available {} NFT, requested {}",
                                amounts.available_nft, request.requested_quantity_nft
                            )));
                        }
                        amounts.available_nft -= request.requested_quantity_nft;
                        amounts.total_nft_redeemed += request.requested_quantity_nft;
                    }
                }

                Some(self.ledger.seal(
                    &balance,
                    amounts,
                    TransactionType::Withdrawal,
                    Some(format!("withdrawal:{}", request.id)),
                    Some(cmd.admin_id),
                ))
            }
            _ => None,
        };

        let processed = self
            .repo
            .finalize_withdrawal(WithdrawalFinalization {
                withdrawal_id: request.id,
                admin_id: cmd.admin_id,
                status: cmd.new_status,
                transaction_hash: cmd.transaction_hash,
                blockchain_hash: cmd.blockchain_hash,
                admin_notes: cmd.notes,
                processed_at: now,
                balance: balance_write,
            })
            .await?;

        tracing::info!(
            withdrawal_id = %processed.id,
            user_id = processed.user_id,
            admin_id = cmd.admin_id,
            status = %processed.status,
            "Withdrawal processed"
        );
        self.ledger
            .record_event(NewSecurityEvent {
                event_type: "withdrawal_processed",
                severity: if processed.status == WithdrawalStatus::Failed {
                    Severity::Warning
                } else {
                    Severity::Info
                },
                user_id: Some(processed.user_id),
                admin_id: Some(cmd.admin_id),
                details: json!({
                    "withdrawal_id": processed.id,
                    "status": processed.status.as_str(),
                    "transaction_hash": processed.transaction_hash,
                }),
            })
            .await;

        Ok(processed)
    }
}

/// 트랜잭션 해시: (0x)? + 64 hex
fn is_valid_tx_hash(hash: &str) -> bool {
    let body = hash.strip_prefix("0x").unwrap_or(hash);
    body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{mock::MockLedgerRepository, BalanceAmounts};
    use crate::services::business_hours::FixedClock;
    use crate::services::commission_security::BalanceUpdate;
    use chrono::TimeZone;

    const WALLET: &str = "0x1234567890123456789012345678901234567890";

    fn tx_hash() -> Option<String> {
        Some(format!("0x{}", "ab".repeat(32)))
    }

    // 2024-06-08 Saturday, 2024-06-10 Monday
    fn saturday_10am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 8, 10, 0, 0).unwrap()
    }

    fn monday_11am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 11, 0, 0).unwrap()
    }

    struct Fixture {
        repo: Arc<MockLedgerRepository>,
        ledger: Arc<CommissionSecurityManager>,
        scheduler: WithdrawalScheduler,
    }

    fn fixture(now: DateTime<Utc>) -> Fixture {
        let repo = Arc::new(MockLedgerRepository::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));
        let ledger = Arc::new(CommissionSecurityManager::new(repo.clone(), "secret", clock.clone()));
        let scheduler = WithdrawalScheduler::new(
            repo.clone(),
            ledger.clone(),
            BusinessHours::new(9, 16, 0).unwrap(),
            clock,
            WithdrawalLimits {
                min_usdt: Decimal::from(10),
                min_nft: 1,
            },
        );
        Fixture { repo, ledger, scheduler }
    }

    async fn credit(ledger: &CommissionSecurityManager, user_id: UserId, usdt: i64, nft: i64) {
        ledger
            .update_user_balance(BalanceUpdate {
                user_id,
                amounts: BalanceAmounts {
                    total_usdt_earned: Decimal::from(usdt),
                    total_nft_earned: nft,
                    available_usdt: Decimal::from(usdt),
                    available_nft: nft,
                    ..Default::default()
                },
                reference_id: None,
                admin_id: None,
                transaction_type: TransactionType::CommissionCredit,
                override_integrity: false,
            })
            .await
            .unwrap();
    }

    fn complete(id: Uuid) -> ProcessCommand {
        ProcessCommand {
            withdrawal_id: id,
            admin_id: 7,
            new_status: WithdrawalStatus::Completed,
            transaction_hash: tx_hash(),
            blockchain_hash: None,
            notes: Some("paid".to_string()),
        }
    }

    #[tokio::test]
    async fn test_weekend_submission_scheduled_for_monday() {
        let f = fixture(saturday_10am());
        credit(&f.ledger, 1, 100, 0).await;

        let result = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(50), 0, WALLET)
            .await
            .unwrap();

        assert_eq!(result.scheduled_for_date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert_eq!(result.withdrawal.status, WithdrawalStatus::Pending);
        assert!(!result.processed_immediately);
        assert!(!result.business_hours_active);

        // 신청만으로는 잔액이 바뀌지 않음
        let balance = f.ledger.get_secure_user_balance(1).await.unwrap();
        assert_eq!(balance.available_usdt_balance, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_submission_validation() {
        let f = fixture(monday_11am());
        credit(&f.ledger, 1, 100, 5).await;

        let below_min = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(5), 0, WALLET)
            .await;
        assert!(matches!(below_min, Err(ApiError::ValidationError(_))));

        let mixed = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Nft, Decimal::from(10), 1, WALLET)
            .await;
        assert!(matches!(mixed, Err(ApiError::ValidationError(_))));

        let bad_wallet = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(10), 0, "T123")
            .await;
        assert!(matches!(bad_wallet, Err(ApiError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_pending_requests_reserve_balance() {
        let f = fixture(monday_11am());
        credit(&f.ledger, 1, 100, 0).await;

        f.scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(70), 0, WALLET)
            .await
            .unwrap();
        // 두 번째 신청: 100 - 70 = 30 < 40
        let second = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(40), 0, WALLET)
            .await;
        assert!(matches!(second, Err(ApiError::InsufficientBalance(_))));
    }

    #[tokio::test]
    async fn test_complete_decrements_balance_atomically() {
        let f = fixture(monday_11am());
        credit(&f.ledger, 1, 100, 4).await;

        let submitted = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(60), 0, WALLET)
            .await
            .unwrap();
        let processed = f
            .scheduler
            .admin_process_withdrawal(complete(submitted.withdrawal.id))
            .await
            .unwrap();

        assert_eq!(processed.status, WithdrawalStatus::Completed);
        assert_eq!(processed.admin_id, Some(7));

        let balance = f.ledger.get_secure_user_balance(1).await.unwrap();
        assert_eq!(balance.available_usdt_balance, Decimal::from(40));
        assert_eq!(balance.total_usdt_withdrawn, Decimal::from(60));
        assert_eq!(balance.available_nft_balance, 4);
        assert_eq!(balance.available_usdt_balance, balance.total_usdt_earned - balance.total_usdt_withdrawn);
        assert!(f.ledger.verify_balance_integrity(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_nft_redemption() {
        let f = fixture(monday_11am());
        credit(&f.ledger, 2, 0, 3).await;

        let submitted = f
            .scheduler
            .submit_withdrawal_request(2, WithdrawalType::Nft, Decimal::ZERO, 2, WALLET)
            .await
            .unwrap();
        f.scheduler
            .admin_process_withdrawal(complete(submitted.withdrawal.id))
            .await
            .unwrap();

        let balance = f.ledger.get_secure_user_balance(2).await.unwrap();
        assert_eq!(balance.available_nft_balance, 1);
        assert_eq!(balance.total_nft_redeemed, 2);
    }

    #[tokio::test]
    async fn test_never_completed_with_insufficient_balance() {
        let f = fixture(monday_11am());
        credit(&f.ledger, 1, 100, 0).await;

        let submitted = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(80), 0, WALLET)
            .await
            .unwrap();

        // 처리 전에 관리자가 잔액을 줄임
        let current = f.ledger.get_secure_user_balance(1).await.unwrap();
        let mut amounts = current.amounts();
        amounts.total_usdt_withdrawn = Decimal::from(50);
        amounts.available_usdt = Decimal::from(50);
        f.ledger
            .update_user_balance(BalanceUpdate {
                user_id: 1,
                amounts,
                reference_id: None,
                admin_id: Some(1),
                transaction_type: TransactionType::BalanceAdjustment,
                override_integrity: false,
            })
            .await
            .unwrap();

        let err = f
            .scheduler
            .admin_process_withdrawal(complete(submitted.withdrawal.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientBalance(_)));

        let request = f.repo.find_withdrawal(submitted.withdrawal.id).await.unwrap().unwrap();
        assert_eq!(request.status, WithdrawalStatus::Pending);
    }

    #[tokio::test]
    async fn test_completion_outside_business_hours_rejected() {
        let f = fixture(saturday_10am());
        credit(&f.ledger, 1, 100, 0).await;
        let submitted = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(20), 0, WALLET)
            .await
            .unwrap();

        let err = f
            .scheduler
            .admin_process_withdrawal(complete(submitted.withdrawal.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::OutsideBusinessHours { .. }));

        // 실패 처리는 영업시간과 무관
        let failed = f
            .scheduler
            .admin_process_withdrawal(ProcessCommand {
                new_status: WithdrawalStatus::Failed,
                transaction_hash: None,
                notes: Some("wallet blacklisted".to_string()),
                ..complete(submitted.withdrawal.id)
            })
            .await
            .unwrap();
        assert_eq!(failed.status, WithdrawalStatus::Failed);
        let balance = f.ledger.get_secure_user_balance(1).await.unwrap();
        assert_eq!(balance.available_usdt_balance, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_completion_before_opening_points_to_today() {
        let monday_7am = Utc.with_ymd_and_hms(2024, 6, 10, 7, 0, 0).unwrap();
        let f = fixture(monday_7am);
        credit(&f.ledger, 1, 100, 0).await;
        let submitted = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(20), 0, WALLET)
            .await
            .unwrap();

        let err = f
            .scheduler
            .admin_process_withdrawal(complete(submitted.withdrawal.id))
            .await
            .unwrap_err();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert!(matches!(
            err,
            ApiError::OutsideBusinessHours { next_business_day } if next_business_day == monday
        ));

        // 마감 후에는 다음 영업일
        let f = fixture(Utc.with_ymd_and_hms(2024, 6, 10, 17, 0, 0).unwrap());
        credit(&f.ledger, 1, 100, 0).await;
        let submitted = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(20), 0, WALLET)
            .await
            .unwrap();
        let err = f
            .scheduler
            .admin_process_withdrawal(complete(submitted.withdrawal.id))
            .await
            .unwrap_err();
        let tuesday = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        assert!(matches!(
            err,
            ApiError::OutsideBusinessHours { next_business_day } if next_business_day == tuesday
        ));
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let f = fixture(monday_11am());
        credit(&f.ledger, 1, 100, 0).await;
        let submitted = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(20), 0, WALLET)
            .await
            .unwrap();
        let id = submitted.withdrawal.id;

        f.scheduler.admin_process_withdrawal(complete(id)).await.unwrap();
        let again = f.scheduler.admin_process_withdrawal(complete(id)).await;
        assert!(matches!(again, Err(ApiError::InvalidState(_))));

        let balance = f.ledger.get_secure_user_balance(1).await.unwrap();
        assert_eq!(balance.available_usdt_balance, Decimal::from(80));
    }

    #[tokio::test]
    async fn test_completion_requires_tx_hash() {
        let f = fixture(monday_11am());
        credit(&f.ledger, 1, 100, 0).await;
        let submitted = f
            .scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(20), 0, WALLET)
            .await
            .unwrap();

        let err = f
            .scheduler
            .admin_process_withdrawal(ProcessCommand {
                transaction_hash: None,
                ..complete(submitted.withdrawal.id)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_admin_queue() {
        let f = fixture(saturday_10am());
        credit(&f.ledger, 1, 100, 0).await;
        credit(&f.ledger, 2, 50, 0).await;
        f.scheduler
            .submit_withdrawal_request(1, WithdrawalType::Usdt, Decimal::from(30), 0, WALLET)
            .await
            .unwrap();
        f.scheduler
            .submit_withdrawal_request(2, WithdrawalType::Usdt, Decimal::from(15), 0, WALLET)
            .await
            .unwrap();

        let queue = f.scheduler.get_pending_withdrawals_for_admin().await.unwrap();
        assert_eq!(queue.count, 2);
        assert_eq!(queue.withdrawals[0].user_id, 1);
        assert_eq!(queue.pending_totals.usdt, Decimal::from(45));
        assert!(!queue.business_hours_active);
        assert_eq!(queue.next_business_day, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert!(!f.scheduler.is_within_business_hours());
    }

    #[test]
    fn test_tx_hash_format() {
        assert!(is_valid_tx_hash(&"a".repeat(64)));
        assert!(is_valid_tx_hash(&format!("0x{}", "F".repeat(64))));
        assert!(!is_valid_tx_hash("0x1234"));
        assert!(!is_valid_tx_hash(""));
    }
}
