//! Repository Pattern Implementation
//!
//! # Design
//!
//! 서비스 레이어는 `LedgerRepository` trait 에만 의존한다.
//!
//! ```text
//! CommissionSecurityManager ─┐
//! WithdrawalScheduler ───────┼──► Arc<dyn LedgerRepository>
//! ReferralCommissionService ─┘          │
//!                                       ├── Database (PostgreSQL, db/mod.rs)
//!                                       └── MockLedgerRepository (tests)
//! ```
//!
//! 여러 단계로 이루어진 변경(잔액 + 미러 + 로그, 출금 완료 + 잔액 차감)은
//! 반드시 trait 메서드 하나로 표현한다. 구현체는 메서드 하나를
//! 하나의 DB 트랜잭션으로 실행해야 한다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::models::*;

/// Repository 에러
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// 다른 writer 가 먼저 잔액을 바꿈 (optimistic lock 실패)
    #[error("balance version conflict for user {user_id} (expected version {expected})")]
    VersionConflict { user_id: UserId, expected: i64 },

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: String, requested: String },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // 23514 = check_violation, 23505 = unique_violation
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                Some("23514") => {
                    return StoreError::ConstraintViolation(db_err.message().to_string())
                }
                Some("23505") => {
                    return StoreError::InvalidTransition(db_err.message().to_string())
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Ledger Repository 인터페이스
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    // ============ Balances ============

    async fn find_balance(&self, user_id: UserId) -> StoreResult<Option<UserBalance>>;
    async fn find_verification(&self, user_id: UserId) -> StoreResult<Option<BalanceVerification>>;

    /// primary + verification 덮어쓰기 + log append (하나의 트랜잭션)
    async fn write_balance(&self, write: BalanceWrite) -> StoreResult<UserBalance>;

    async fn list_transactions(
        &self,
        user_id: UserId,
        page: u32,
        limit: u32,
    ) -> StoreResult<(Vec<TransactionLogEntry>, i64)>;

    // ============ Security audit ============

    async fn record_security_event(&self, event: NewSecurityEvent) -> StoreResult<()>;
    async fn recent_security_events(&self, limit: u32) -> StoreResult<Vec<SecurityAuditLogEntry>>;

    // ============ Withdrawals ============

    /// available − Σ pending ≥ requested 검사와 insert 를 원자적으로 수행
    async fn insert_withdrawal(&self, withdrawal: NewWithdrawal) -> StoreResult<WithdrawalRequest>;
    async fn find_withdrawal(&self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>>;
    async fn list_withdrawals(
        &self,
        filter: WithdrawalFilter,
        oldest_first: bool,
    ) -> StoreResult<Vec<WithdrawalRequest>>;
    async fn pending_withdrawal_totals(&self, user_id: Option<UserId>) -> StoreResult<PendingTotals>;

    /// pending 요청을 terminal 상태로 변경 (+ 잔액 쓰기, 하나의 트랜잭션)
    async fn finalize_withdrawal(
        &self,
        finalization: WithdrawalFinalization,
    ) -> StoreResult<WithdrawalRequest>;

    // ============ Referrals ============

    async fn find_referrer(&self, user_id: UserId) -> StoreResult<Option<UserId>>;
    /// 이미 추천인이 있으면 InvalidTransition (덮어쓰지 않음)
    async fn link_referral(&self, user_id: UserId, referrer_id: UserId) -> StoreResult<()>;

    /// (investment_id, level) 중복은 무시, 실제 삽입된 행만 반환
    async fn insert_commissions(
        &self,
        rows: Vec<NewCommission>,
    ) -> StoreResult<Vec<ReferralCommission>>;
    async fn list_commissions(&self, referrer_id: UserId) -> StoreResult<Vec<ReferralCommission>>;

    /// pending → paid, 영향받은 referrer id 목록 반환
    async fn mark_commissions_paid(
        &self,
        scope: ActivationScope,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Vec<UserId>>;
    async fn cancel_commissions(&self, investment_id: &str) -> StoreResult<u64>;
    async fn commission_totals(&self, referrer_id: UserId) -> StoreResult<CommissionTotals>;

    // ============ Plans ============

    async fn list_plans(&self) -> StoreResult<Vec<InvestmentPlan>>;
    async fn insert_plan(&self, plan: NewPlan) -> StoreResult<InvestmentPlan>;

    /// 이름이 같은 플랜 중 id 가 가장 작은 것만 남기고 삭제
    async fn delete_duplicate_plans(&self) -> StoreResult<u64>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::RwLock;

    use rust_decimal::Decimal;

    #[derive(Default)]
    struct MockState {
        balances: HashMap<UserId, UserBalance>,
        verifications: HashMap<UserId, BalanceVerification>,
        transactions: Vec<TransactionLogEntry>,
        security_events: Vec<SecurityAuditLogEntry>,
        withdrawals: Vec<WithdrawalRequest>,
        referrals: HashMap<UserId, UserId>,
        commissions: Vec<ReferralCommission>,
        plans: Vec<InvestmentPlan>,
        next_id: i64,
    }

    impl MockState {
        fn next_id(&mut self) -> i64 {
            self.next_id += 1;
            self.next_id
        }

        /// DB 의 version 검사 + CHECK constraint 와 같은 규칙
        fn check_write(&self, write: &BalanceWrite) -> StoreResult<()> {
            let current = self.balances.get(&write.user_id).map(|b| b.version).unwrap_or(0);
            if current != write.expected_version {
                return Err(StoreError::VersionConflict {
                    user_id: write.user_id,
                    expected: write.expected_version,
                });
            }
            if write.amounts.has_negative() || !write.amounts.is_consistent() {
                return Err(StoreError::ConstraintViolation(
                    "commission_balances check".to_string(),
                ));
            }
            Ok(())
        }

        fn apply_write(&mut self, write: &BalanceWrite) -> UserBalance {
            let now = Utc::now();
            let before = self
                .balances
                .get(&write.user_id)
                .map(|b| b.amounts())
                .unwrap_or_default();
            let version = write.new_version();
            let a = write.amounts;

            let balance = UserBalance {
                user_id: write.user_id,
                total_usdt_earned: a.total_usdt_earned,
                total_nft_earned: a.total_nft_earned,
                available_usdt_balance: a.available_usdt,
                available_nft_balance: a.available_nft,
                total_usdt_withdrawn: a.total_usdt_withdrawn,
                total_nft_redeemed: a.total_nft_redeemed,
                last_reference_id: write.reference_id.clone(),
                last_admin_id: write.admin_id,
                version,
                balance_hash: write.balance_hash.clone(),
                updated_at: now,
            };
            self.balances.insert(write.user_id, balance.clone());
            self.verifications.insert(
                write.user_id,
                BalanceVerification {
                    user_id: write.user_id,
                    total_usdt_earned: a.total_usdt_earned,
                    total_nft_earned: a.total_nft_earned,
                    available_usdt_balance: a.available_usdt,
                    available_nft_balance: a.available_nft,
                    total_usdt_withdrawn: a.total_usdt_withdrawn,
                    total_nft_redeemed: a.total_nft_redeemed,
                    version,
                    verification_hash: write.verification_hash.clone(),
                    updated_at: now,
                },
            );

            let id = self.next_id();
            self.transactions.push(TransactionLogEntry {
                id,
                user_id: write.user_id,
                transaction_type: write.transaction_type.as_str().to_string(),
                usdt_delta: a.available_usdt - before.available_usdt,
                nft_delta: a.available_nft - before.available_nft,
                balance_before_usdt: before.available_usdt,
                balance_after_usdt: a.available_usdt,
                balance_before_nft: before.available_nft,
                balance_after_nft: a.available_nft,
                reference_id: write.reference_id.clone(),
                admin_id: write.admin_id,
                balance_version: version,
                created_at: now,
            });

            balance
        }

        fn pending_totals(&self, user_id: Option<UserId>) -> PendingTotals {
            self.withdrawals
                .iter()
                .filter(|w| w.status == WithdrawalStatus::Pending)
                .filter(|w| user_id.map_or(true, |u| w.user_id == u))
                .fold(PendingTotals::default(), |acc, w| PendingTotals {
                    usdt: acc.usdt + w.requested_amount_usdt,
                    nft: acc.nft + w.requested_quantity_nft,
                })
        }
    }

    /// 테스트용 in-memory 구현
    ///
    /// 하나의 RwLock 아래에서 모든 변경을 수행하므로 메서드 단위로 원자적
    pub struct MockLedgerRepository {
        state: RwLock<MockState>,
    }

    impl MockLedgerRepository {
        pub fn new() -> Self {
            Self {
                state: RwLock::new(MockState::default()),
            }
        }

        /// verification 행 직접 조작 (무결성 테스트용)
        pub fn tamper_verification(&self, user_id: UserId, f: impl FnOnce(&mut BalanceVerification)) {
            let mut state = self.state.write().unwrap();
            if let Some(v) = state.verifications.get_mut(&user_id) {
                f(v);
            }
        }

        /// primary 행 직접 조작 (무결성 테스트용)
        pub fn tamper_balance(&self, user_id: UserId, f: impl FnOnce(&mut UserBalance)) {
            let mut state = self.state.write().unwrap();
            if let Some(b) = state.balances.get_mut(&user_id) {
                f(b);
            }
        }

        pub fn remove_verification(&self, user_id: UserId) {
            self.state.write().unwrap().verifications.remove(&user_id);
        }

        pub fn transaction_count(&self, user_id: UserId) -> usize {
            let state = self.state.read().unwrap();
            state.transactions.iter().filter(|t| t.user_id == user_id).count()
        }

        pub fn security_event_types(&self) -> Vec<String> {
            let state = self.state.read().unwrap();
            state.security_events.iter().map(|e| e.event_type.clone()).collect()
        }
    }

    #[async_trait]
    impl LedgerRepository for MockLedgerRepository {
        async fn health_check(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn find_balance(&self, user_id: UserId) -> StoreResult<Option<UserBalance>> {
            Ok(self.state.read().unwrap().balances.get(&user_id).cloned())
        }

        async fn find_verification(&self, user_id: UserId) -> StoreResult<Option<BalanceVerification>> {
            Ok(self.state.read().unwrap().verifications.get(&user_id).cloned())
        }

        async fn write_balance(&self, write: BalanceWrite) -> StoreResult<UserBalance> {
            let mut state = self.state.write().unwrap();
            state.check_write(&write)?;
            Ok(state.apply_write(&write))
        }

        async fn list_transactions(
            &self,
            user_id: UserId,
            page: u32,
            limit: u32,
        ) -> StoreResult<(Vec<TransactionLogEntry>, i64)> {
            let state = self.state.read().unwrap();
            let mut entries: Vec<_> = state
                .transactions
                .iter()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect();
            entries.sort_by(|a, b| b.id.cmp(&a.id));
            let total = entries.len() as i64;
            let page = entries
                .into_iter()
                .skip((page * limit) as usize)
                .take(limit as usize)
                .collect();
            Ok((page, total))
        }

        async fn record_security_event(&self, event: NewSecurityEvent) -> StoreResult<()> {
            let mut state = self.state.write().unwrap();
            let id = state.next_id();
            state.security_events.push(SecurityAuditLogEntry {
                id,
                event_type: event.event_type.to_string(),
                severity: event.severity.as_str().to_string(),
                user_id: event.user_id,
                admin_id: event.admin_id,
                details: event.details,
                created_at: Utc::now(),
            });
            Ok(())
        }

        async fn recent_security_events(&self, limit: u32) -> StoreResult<Vec<SecurityAuditLogEntry>> {
            let state = self.state.read().unwrap();
            Ok(state.security_events.iter().rev().take(limit as usize).cloned().collect())
        }

        async fn insert_withdrawal(&self, withdrawal: NewWithdrawal) -> StoreResult<WithdrawalRequest> {
            let mut state = self.state.write().unwrap();
            let amounts = state
                .balances
                .get(&withdrawal.user_id)
                .map(|b| b.amounts())
                .unwrap_or_default();
            let pending = state.pending_totals(Some(withdrawal.user_id));

            match withdrawal.withdrawal_type {
                WithdrawalType::Usdt => {
                    let free = amounts.available_usdt - pending.usdt;
                    if free < withdrawal.requested_amount_usdt {
                        return Err(StoreError::InsufficientFunds {
                            available: free.to_string(),
                            requested: withdrawal.requested_amount_usdt.to_string(),
                        });
                    }
                }
                WithdrawalType::Nft => {
                    let free = amounts.available_nft - pending.nft;
                    if free < withdrawal.requested_quantity_nft {
                        return Err(StoreError::InsufficientFunds {
                            available: free.to_string(),
                            requested: withdrawal.requested_quantity_nft.to_string(),
                        });
                    }
                }
            }

            let request = WithdrawalRequest {
                id: Uuid::new_v4(),
                user_id: withdrawal.user_id,
                withdrawal_type: withdrawal.withdrawal_type,
                requested_amount_usdt: withdrawal.requested_amount_usdt,
                requested_quantity_nft: withdrawal.requested_quantity_nft,
                wallet_address: withdrawal.wallet_address,
                status: WithdrawalStatus::Pending,
                scheduled_for_date: withdrawal.scheduled_for_date,
                transaction_hash: None,
                blockchain_hash: None,
                admin_id: None,
                admin_notes: None,
                created_at: Utc::now(),
                processed_at: None,
            };
            state.withdrawals.push(request.clone());
            Ok(request)
        }

        async fn find_withdrawal(&self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
            let state = self.state.read().unwrap();
            Ok(state.withdrawals.iter().find(|w| w.id == id).cloned())
        }

        async fn list_withdrawals(
            &self,
            filter: WithdrawalFilter,
            oldest_first: bool,
        ) -> StoreResult<Vec<WithdrawalRequest>> {
            let state = self.state.read().unwrap();
            // insertion order == created_at order
            let mut rows: Vec<_> = state
                .withdrawals
                .iter()
                .filter(|w| filter.user_id.map_or(true, |u| w.user_id == u))
                .filter(|w| filter.status.map_or(true, |s| w.status == s))
                .cloned()
                .collect();
            if !oldest_first {
                rows.reverse();
            }
            Ok(rows)
        }

        async fn pending_withdrawal_totals(&self, user_id: Option<UserId>) -> StoreResult<PendingTotals> {
            Ok(self.state.read().unwrap().pending_totals(user_id))
        }

        async fn finalize_withdrawal(
            &self,
            finalization: WithdrawalFinalization,
        ) -> StoreResult<WithdrawalRequest> {
            let mut state = self.state.write().unwrap();
            let idx = state
                .withdrawals
                .iter()
                .position(|w| w.id == finalization.withdrawal_id)
                .ok_or_else(|| StoreError::NotFound("Withdrawal".to_string()))?;

            let current = &state.withdrawals[idx];
            if current.status != WithdrawalStatus::Pending {
                return Err(StoreError::InvalidTransition(format!(
                    "withdrawal is already {}",
                    current.status
                )));
            }
            if let Some(write) = &finalization.balance {
                if write.user_id != current.user_id {
                    return Err(StoreError::InvalidTransition(
                        "balance write targets another user".to_string(),
                    ));
                }
                state.check_write(write)?;
                state.apply_write(write);
            }

            let w = &mut state.withdrawals[idx];
            w.status = finalization.status;
            w.admin_id = Some(finalization.admin_id);
            w.transaction_hash = finalization.transaction_hash;
            w.blockchain_hash = finalization.blockchain_hash;
            w.admin_notes = finalization.admin_notes;
            w.processed_at = Some(finalization.processed_at);
            Ok(w.clone())
        }

        async fn find_referrer(&self, user_id: UserId) -> StoreResult<Option<UserId>> {
            Ok(self.state.read().unwrap().referrals.get(&user_id).copied())
        }

        async fn link_referral(&self, user_id: UserId, referrer_id: UserId) -> StoreResult<()> {
            let mut state = self.state.write().unwrap();
            if state.referrals.contains_key(&user_id) {
                return Err(StoreError::InvalidTransition(format!(
                    "user {} already has a referrer",
                    user_id
                )));
            }
            state.referrals.insert(user_id, referrer_id);
            Ok(())
        }

        async fn insert_commissions(
            &self,
            rows: Vec<NewCommission>,
        ) -> StoreResult<Vec<ReferralCommission>> {
            let mut state = self.state.write().unwrap();
            let mut inserted = Vec::new();
            for row in rows {
                let exists = state
                    .commissions
                    .iter()
                    .any(|c| c.investment_id == row.investment_id && c.level == row.level);
                if exists {
                    continue;
                }
                let commission = ReferralCommission {
                    id: Uuid::new_v4(),
                    referrer_id: row.referrer_id,
                    referred_id: row.referred_id,
                    investment_id: row.investment_id,
                    level: row.level,
                    purchase_amount: row.purchase_amount,
                    commission_usdt: row.commission_usdt,
                    commission_nft: row.commission_nft,
                    status: CommissionStatus::Pending,
                    created_at: Utc::now(),
                    paid_at: None,
                };
                state.commissions.push(commission.clone());
                inserted.push(commission);
            }
            Ok(inserted)
        }

        async fn list_commissions(&self, referrer_id: UserId) -> StoreResult<Vec<ReferralCommission>> {
            let state = self.state.read().unwrap();
            Ok(state
                .commissions
                .iter()
                .rev()
                .filter(|c| c.referrer_id == referrer_id)
                .cloned()
                .collect())
        }

        async fn mark_commissions_paid(
            &self,
            scope: ActivationScope,
            paid_at: DateTime<Utc>,
        ) -> StoreResult<Vec<UserId>> {
            let mut state = self.state.write().unwrap();
            let mut referrers = HashSet::new();
            for c in state.commissions.iter_mut() {
                let in_scope = match &scope {
                    ActivationScope::All => true,
                    ActivationScope::Investment(id) => &c.investment_id == id,
                };
                if in_scope && c.status == CommissionStatus::Pending {
                    c.status = CommissionStatus::Paid;
                    c.paid_at = Some(paid_at);
                    referrers.insert(c.referrer_id);
                }
            }
            let mut ids: Vec<_> = referrers.into_iter().collect();
            ids.sort_unstable();
            Ok(ids)
        }

        async fn cancel_commissions(&self, investment_id: &str) -> StoreResult<u64> {
            let mut state = self.state.write().unwrap();
            let mut count = 0;
            for c in state.commissions.iter_mut() {
                if c.investment_id == investment_id && c.status == CommissionStatus::Pending {
                    c.status = CommissionStatus::Cancelled;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn commission_totals(&self, referrer_id: UserId) -> StoreResult<CommissionTotals> {
            let state = self.state.read().unwrap();
            let mut totals = CommissionTotals::default();
            for c in state.commissions.iter().filter(|c| c.referrer_id == referrer_id) {
                match c.status {
                    CommissionStatus::Paid => {
                        totals.paid_usdt += c.commission_usdt;
                        totals.paid_nft += c.commission_nft;
                    }
                    CommissionStatus::Pending => {
                        totals.pending_usdt += c.commission_usdt;
                        totals.pending_nft += c.commission_nft;
                    }
                    CommissionStatus::Cancelled => {}
                }
            }
            Ok(totals)
        }

        async fn list_plans(&self) -> StoreResult<Vec<InvestmentPlan>> {
            Ok(self.state.read().unwrap().plans.clone())
        }

        async fn insert_plan(&self, plan: NewPlan) -> StoreResult<InvestmentPlan> {
            let mut state = self.state.write().unwrap();
            let id = state.next_id();
            let plan = InvestmentPlan {
                id,
                name: plan.name,
                price_usdt: plan.price_usdt,
                shares: plan.shares,
                created_at: Utc::now(),
            };
            state.plans.push(plan.clone());
            Ok(plan)
        }

        async fn delete_duplicate_plans(&self) -> StoreResult<u64> {
            let mut state = self.state.write().unwrap();
            let mut keep: HashMap<String, i64> = HashMap::new();
            for plan in &state.plans {
                let key = plan_name_key(&plan.name);
                let entry = keep.entry(key).or_insert(plan.id);
                *entry = (*entry).min(plan.id);
            }
            let before = state.plans.len();
            state
                .plans
                .retain(|p| keep.get(&plan_name_key(&p.name)) == Some(&p.id));
            Ok((before - state.plans.len()) as u64)
        }
    }

    #[tokio::test]
    async fn test_mock_version_conflict() {
        let repo = MockLedgerRepository::new();
        let write = BalanceWrite {
            user_id: 1,
            amounts: BalanceAmounts {
                total_usdt_earned: Decimal::from(10),
                available_usdt: Decimal::from(10),
                ..Default::default()
            },
            expected_version: 0,
            balance_hash: "h".to_string(),
            verification_hash: "v".to_string(),
            transaction_type: TransactionType::BalanceAdjustment,
            reference_id: None,
            admin_id: None,
        };
        repo.write_balance(write.clone()).await.unwrap();

        // 같은 expected_version 으로 두 번째 쓰기 → 충돌
        let err = repo.write_balance(write).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { user_id: 1, expected: 0 }));
    }

    #[tokio::test]
    async fn test_mock_link_referral_is_write_once() {
        let repo = MockLedgerRepository::new();
        repo.link_referral(2, 1).await.unwrap();

        let err = repo.link_referral(2, 5).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
        assert_eq!(repo.find_referrer(2).await.unwrap(), Some(1));
    }
}
