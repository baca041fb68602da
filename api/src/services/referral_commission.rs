//! Referral Commission Service
//!
//! # Interview Q&A
//!
//! Q: 커미션 잔액을 증분(+=)이 아니라 재계산으로 쓰는 이유는?
//! A: paid 커미션 행이 원천 데이터
//!    - total_earned = Σ paid, available = earned − withdrawn
//!    - 같은 활성화를 두 번 실행해도 잔액이 두 번 늘지 않음
//!
//! Q: 추천 체인에 사이클이 생기면?
//! A: 링크 등록 시 거부하고, 커미션 계산 시에도 방문한 사용자를 만나면 중단

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    config::Config,
    db::{
        ActivationScope, AdminId, CommissionTotals, LedgerRepository, NewCommission,
        ReferralCommission, TransactionType, UserBalance, UserId,
    },
    error::ApiError,
    services::commission_security::{BalanceUpdate, CommissionSecurityManager},
    types::{exceeds_usdt_scale, truncate_usdt},
};

/// 추천 체인 탐색 상한 (link 사이클 검사용)
const MAX_CHAIN_DEPTH: usize = 64;

/// 레벨별 커미션 비율
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRate {
    pub usdt_pct: Decimal,
    pub nft_pct: Decimal,
}

/// 계산된 레벨 커미션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelCommission {
    pub level: i16,
    pub usdt: Decimal,
    pub nft: i64,
}

/// 커미션 스케줄 (level 1..=N)
#[derive(Debug, Clone)]
pub struct CommissionSchedule {
    levels: Vec<LevelRate>,
    nft_unit_price: Decimal,
}

impl CommissionSchedule {
    pub fn new(levels: Vec<LevelRate>, nft_unit_price: Decimal) -> Self {
        Self {
            levels,
            nft_unit_price,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let levels = config
            .commission_usdt_rates
            .iter()
            .zip(config.commission_nft_rates.iter())
            .map(|(&usdt_pct, &nft_pct)| LevelRate { usdt_pct, nft_pct })
            .collect();
        Self::new(levels, config.nft_unit_price_usdt)
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// 투자 금액에 대한 레벨별 커미션
    ///
    /// USDT 는 6 자리 절사, NFT 는 floor(amount × pct / 100 / unit_price)
    pub fn compute(&self, amount: Decimal) -> Vec<LevelCommission> {
        let hundred = Decimal::ONE_HUNDRED;
        self.levels
            .iter()
            .enumerate()
            .map(|(idx, rate)| {
                let usdt = truncate_usdt(amount * rate.usdt_pct / hundred);
                let nft = if self.nft_unit_price.is_zero() {
                    0
                } else {
                    (amount * rate.nft_pct / hundred / self.nft_unit_price)
                        .floor()
                        .to_i64()
                        .unwrap_or(0)
                };
                LevelCommission {
                    level: idx as i16 + 1,
                    usdt,
                    nft,
                }
            })
            .collect()
    }
}

/// 커미션 기록 결과
#[derive(Debug, Serialize)]
pub struct RecordedCommissions {
    pub investment_id: String,
    pub chain: Vec<UserId>,
    pub inserted: Vec<ReferralCommission>,
}

/// 활성화 결과
#[derive(Debug, Serialize)]
pub struct ActivationResult {
    pub balances: Vec<UserBalance>,
    /// 재계산 실패 referrer (paid 상태는 유지, recompute 로 복구)
    pub failed_referrers: Vec<UserId>,
}

#[derive(Debug, Serialize)]
pub struct CommissionSummary {
    pub totals: CommissionTotals,
    pub commissions: Vec<ReferralCommission>,
}

pub struct ReferralCommissionService {
    repo: Arc<dyn LedgerRepository>,
    ledger: Arc<CommissionSecurityManager>,
    schedule: CommissionSchedule,
}

impl ReferralCommissionService {
    pub fn new(
        repo: Arc<dyn LedgerRepository>,
        ledger: Arc<CommissionSecurityManager>,
        schedule: CommissionSchedule,
    ) -> Self {
        Self {
            repo,
            ledger,
            schedule,
        }
    }

    /// 추천인 등록
    pub async fn link_referral(&self, user_id: UserId, referrer_id: UserId) -> Result<(), ApiError> {
        if user_id == referrer_id {
            return Err(ApiError::ValidationError("user cannot refer themselves".to_string()));
        }
        if let Some(existing) = self.repo.find_referrer(user_id).await? {
            return Err(ApiError::InvalidState(format!(
                "user {} is already referred by {}",
                user_id, existing
            )));
        }

        // referrer 의 상위 체인에 user 가 있으면 사이클
        let mut current = referrer_id;
        for _ in 0..MAX_CHAIN_DEPTH {
            match self.repo.find_referrer(current).await? {
                Some(parent) if parent == user_id => {
                    return Err(ApiError::ValidationError(
                        "referral link would create a cycle".to_string(),
                    ));
                }
                Some(parent) => current = parent,
                None => break,
            }
        }

        self.repo.link_referral(user_id, referrer_id).await?;
        tracing::info!(user_id, referrer_id, "Referral linked");
        Ok(())
    }

    /// 투자 1건에 대한 pending 커미션 기록 (재실행 시 추가 행 없음)
    pub async fn record_investment_commissions(
        &self,
        investment_id: &str,
        investor_id: UserId,
        amount: Decimal,
    ) -> Result<RecordedCommissions, ApiError> {
        let investment_id = investment_id.trim();
        if investment_id.is_empty() {
            return Err(ApiError::ValidationError("investment_id is required".to_string()));
        }
        if amount <= Decimal::ZERO {
            return Err(ApiError::ValidationError("investment amount must be positive".to_string()));
        }
        if exceeds_usdt_scale(amount) {
            return Err(ApiError::ValidationError(
                "investment amount has too many decimal places".to_string(),
            ));
        }

        let chain = self.ancestors(investor_id).await?;
        let rows = chain
            .iter()
            .zip(self.schedule.compute(amount))
            .map(|(&referrer_id, c)| NewCommission {
                referrer_id,
                referred_id: investor_id,
                investment_id: investment_id.to_string(),
                level: c.level,
                purchase_amount: amount,
                commission_usdt: c.usdt,
                commission_nft: c.nft,
            })
            .collect::<Vec<_>>();

        let inserted = if rows.is_empty() {
            Vec::new()
        } else {
            self.repo.insert_commissions(rows).await?
        };

        tracing::info!(
            investment_id,
            investor_id,
            %amount,
            levels = chain.len(),
            inserted = inserted.len(),
            "Investment commissions recorded"
        );

        Ok(RecordedCommissions {
            investment_id: investment_id.to_string(),
            chain,
            inserted,
        })
    }

    /// 투자자의 상위 추천인 (최대 스케줄 깊이)
    async fn ancestors(&self, investor_id: UserId) -> Result<Vec<UserId>, ApiError> {
        let mut chain = Vec::with_capacity(self.schedule.depth());
        let mut seen = HashSet::from([investor_id]);
        let mut current = investor_id;

        while chain.len() < self.schedule.depth() {
            let Some(referrer) = self.repo.find_referrer(current).await? else {
                break;
            };
            if !seen.insert(referrer) {
                tracing::warn!(investor_id, referrer, "Referral cycle detected, chain truncated");
                break;
            }
            chain.push(referrer);
            current = referrer;
        }
        Ok(chain)
    }

    /// pending → paid 후 영향받은 referrer 잔액 재계산
    pub async fn activate_pending_commissions(
        &self,
        scope: ActivationScope,
        admin_id: Option<AdminId>,
    ) -> Result<ActivationResult, ApiError> {
        let referrers = self.repo.mark_commissions_paid(scope.clone(), Utc::now()).await?;
        tracing::info!(?scope, referrers = referrers.len(), "Commissions activated");

        let mut balances = Vec::with_capacity(referrers.len());
        let mut failed_referrers = Vec::new();
        for referrer_id in referrers {
            match self
                .recompute(referrer_id, TransactionType::CommissionCredit, admin_id)
                .await
            {
                Ok(balance) => balances.push(balance),
                Err(e) => {
                    tracing::error!(referrer_id, error = %e, "Balance recompute after activation failed");
                    failed_referrers.push(referrer_id);
                }
            }
        }

        Ok(ActivationResult {
            balances,
            failed_referrers,
        })
    }

    pub async fn cancel_investment_commissions(&self, investment_id: &str) -> Result<u64, ApiError> {
        let cancelled = self.repo.cancel_commissions(investment_id).await?;
        tracing::info!(investment_id, cancelled, "Pending commissions cancelled");
        Ok(cancelled)
    }

    /// paid 커미션 합계로 잔액 재계산
    pub async fn recompute_user_balance(
        &self,
        user_id: UserId,
        admin_id: Option<AdminId>,
    ) -> Result<UserBalance, ApiError> {
        self.recompute(user_id, TransactionType::Recompute, admin_id).await
    }

    async fn recompute(
        &self,
        user_id: UserId,
        transaction_type: TransactionType,
        admin_id: Option<AdminId>,
    ) -> Result<UserBalance, ApiError> {
        let current = self.ledger.get_secure_user_balance(user_id).await?;
        let totals = self.repo.commission_totals(user_id).await?;

        let mut amounts = current.amounts();
        amounts.total_usdt_earned = totals.paid_usdt;
        amounts.total_nft_earned = totals.paid_nft;
        amounts.available_usdt = totals.paid_usdt - amounts.total_usdt_withdrawn;
        amounts.available_nft = totals.paid_nft - amounts.total_nft_redeemed;

        if amounts == current.amounts() {
            return Ok(current);
        }

        self.ledger
            .update_user_balance(BalanceUpdate {
                user_id,
                amounts,
                reference_id: Some(format!("recompute:{}", user_id)),
                admin_id,
                transaction_type,
                override_integrity: false,
            })
            .await
    }

    pub async fn commission_summary(&self, user_id: UserId) -> Result<CommissionSummary, ApiError> {
        let totals = self.repo.commission_totals(user_id).await?;
        let commissions = self.repo.list_commissions(user_id).await?;
        Ok(CommissionSummary { totals, commissions })
    }
}
