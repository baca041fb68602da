//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 잔액 변경의 원자성은 어떻게 보장하는가?
//! A: Repository 메서드 하나 = DB 트랜잭션 하나
//!
//!    - primary / verification / transaction log 를 같은 트랜잭션에서 기록
//!    - 출금 완료 상태 변경과 잔액 차감도 같은 트랜잭션
//!    - 중간에 프로세스가 죽으면 전체가 rollback
//!
//! Q: 동시 쓰기(race)는?
//! A: 두 가지 장치
//!
//!    1. `version` 컬럼 기반 optimistic lock
//!       `UPDATE ... WHERE user_id = $1 AND version = $expected`
//!    2. 출금 신청 시 잔액 행 `SELECT ... FOR UPDATE`
//!       → 같은 사용자의 동시 신청이 직렬화되어 이중 출금 방지
//!
//!    최종 방어선은 CHECK constraint (`available >= 0`, `available = earned - withdrawn`)
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - 타임아웃 처리

mod models;
mod repository;

pub use models::*;
pub use repository::{LedgerRepository, StoreError, StoreResult};

#[cfg(test)]
pub use repository::mock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use uuid::Uuid;

const BALANCE_COLUMNS: &str = r#"
    user_id, total_usdt_earned, total_nft_earned,
    available_usdt_balance, available_nft_balance,
    total_usdt_withdrawn, total_nft_redeemed,
    last_reference_id, last_admin_id, version, balance_hash, updated_at
"#;

const WITHDRAWAL_COLUMNS: &str = r#"
    id, user_id, withdrawal_type, requested_amount_usdt, requested_quantity_nft,
    wallet_address, status, scheduled_for_date, transaction_hash, blockchain_hash,
    admin_id, admin_notes, created_at, processed_at
"#;

const COMMISSION_COLUMNS: &str = r#"
    id, referrer_id, referred_id, investment_id, level, purchase_amount,
    commission_usdt, commission_nft, status, created_at, paid_at
"#;

/// 데이터베이스 연결 및 쿼리 담당 (PostgreSQL `LedgerRepository` 구현)
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// 트랜잭션 안에서 잔액 쓰기 (primary → verification → log)
    async fn apply_balance_write(
        tx: &mut Transaction<'_, Postgres>,
        write: &BalanceWrite,
    ) -> StoreResult<UserBalance> {
        let current = sqlx::query_as::<_, UserBalance>(&format!(
            "SELECT {} FROM commission_balances WHERE user_id = $1 FOR UPDATE",
            BALANCE_COLUMNS
        ))
        .bind(write.user_id)
        .fetch_optional(&mut **tx)
        .await?;

        let current_version = current.as_ref().map(|b| b.version).unwrap_or(0);
        if current_version != write.expected_version {
            return Err(StoreError::VersionConflict {
                user_id: write.user_id,
                expected: write.expected_version,
            });
        }
        let before = current.map(|b| b.amounts()).unwrap_or_default();
        let a = write.amounts;
        let version = write.new_version();

        let sql = if write.expected_version == 0 {
            format!(
                r#"
                INSERT INTO commission_balances (
                    user_id, total_usdt_earned, total_nft_earned,
                    available_usdt_balance, available_nft_balance,
                    total_usdt_withdrawn, total_nft_redeemed,
                    last_reference_id, last_admin_id, version, balance_hash, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
                RETURNING {}
                "#,
                BALANCE_COLUMNS
            )
        } else {
            format!(
                r#"
                UPDATE commission_balances SET
                    total_usdt_earned = $2,
                    total_nft_earned = $3,
                    available_usdt_balance = $4,
                    available_nft_balance = $5,
                    total_usdt_withdrawn = $6,
                    total_nft_redeemed = $7,
                    last_reference_id = $8,
                    last_admin_id = $9,
                    version = $10,
                    balance_hash = $11,
                    updated_at = NOW()
                WHERE user_id = $1 AND version = $10 - 1
                RETURNING {}
                "#,
                BALANCE_COLUMNS
            )
        };

        let balance = sqlx::query_as::<_, UserBalance>(&sql)
            .bind(write.user_id)
            .bind(a.total_usdt_earned)
            .bind(a.total_nft_earned)
            .bind(a.available_usdt)
            .bind(a.available_nft)
            .bind(a.total_usdt_withdrawn)
            .bind(a.total_nft_redeemed)
            .bind(&write.reference_id)
            .bind(write.admin_id)
            .bind(version)
            .bind(&write.balance_hash)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::VersionConflict {
                user_id: write.user_id,
                expected: write.expected_version,
            })?;

        sqlx::query(
            r#"
            INSERT INTO commission_balance_verification (
                user_id, total_usdt_earned, total_nft_earned,
                available_usdt_balance, available_nft_balance,
                total_usdt_withdrawn, total_nft_redeemed,
                version, verification_hash, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET
                total_usdt_earned = EXCLUDED.total_usdt_earned,
                total_nft_earned = EXCLUDED.total_nft_earned,
                available_usdt_balance = EXCLUDED.available_usdt_balance,
                available_nft_balance = EXCLUDED.available_nft_balance,
                total_usdt_withdrawn = EXCLUDED.total_usdt_withdrawn,
                total_nft_redeemed = EXCLUDED.total_nft_redeemed,
                version = EXCLUDED.version,
                verification_hash = EXCLUDED.verification_hash,
                updated_at = NOW()
            "#,
        )
        .bind(write.user_id)
        .bind(a.total_usdt_earned)
        .bind(a.total_nft_earned)
        .bind(a.available_usdt)
        .bind(a.available_nft)
        .bind(a.total_usdt_withdrawn)
        .bind(a.total_nft_redeemed)
        .bind(version)
        .bind(&write.verification_hash)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO commission_transaction_log (
                user_id, transaction_type, usdt_delta, nft_delta,
                balance_before_usdt, balance_after_usdt,
                balance_before_nft, balance_after_nft,
                reference_id, admin_id, balance_version, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            "#,
        )
        .bind(write.user_id)
        .bind(write.transaction_type.as_str())
        .bind(a.available_usdt - before.available_usdt)
        .bind(a.available_nft - before.available_nft)
        .bind(before.available_usdt)
        .bind(a.available_usdt)
        .bind(before.available_nft)
        .bind(a.available_nft)
        .bind(&write.reference_id)
        .bind(write.admin_id)
        .bind(version)
        .execute(&mut **tx)
        .await?;

        Ok(balance)
    }
}

fn withdrawal_from_row(row: WithdrawalRow) -> StoreResult<WithdrawalRequest> {
    WithdrawalRequest::try_from(row).map_err(StoreError::Corrupt)
}

fn commission_from_row(row: CommissionRow) -> StoreResult<ReferralCommission> {
    ReferralCommission::try_from(row).map_err(StoreError::Corrupt)
}

#[async_trait]
impl LedgerRepository for Database {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_balance(&self, user_id: UserId) -> StoreResult<Option<UserBalance>> {
        let balance = sqlx::query_as::<_, UserBalance>(&format!(
            "SELECT {} FROM commission_balances WHERE user_id = $1",
            BALANCE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn find_verification(&self, user_id: UserId) -> StoreResult<Option<BalanceVerification>> {
        let verification = sqlx::query_as::<_, BalanceVerification>(
            r#"
            SELECT
                user_id, total_usdt_earned, total_nft_earned,
                available_usdt_balance, available_nft_balance,
                total_usdt_withdrawn, total_nft_redeemed,
                version, verification_hash, updated_at
            FROM commission_balance_verification
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(verification)
    }

    async fn write_balance(&self, write: BalanceWrite) -> StoreResult<UserBalance> {
        let mut tx = self.pool.begin().await?;
        let balance = Self::apply_balance_write(&mut tx, &write).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn list_transactions(
        &self,
        user_id: UserId,
        page: u32,
        limit: u32,
    ) -> StoreResult<(Vec<TransactionLogEntry>, i64)> {
        let offset = i64::from(page) * i64::from(limit);

        let entries = sqlx::query_as::<_, TransactionLogEntry>(
            r#"
            SELECT
                id, user_id, transaction_type, usdt_delta, nft_delta,
                balance_before_usdt, balance_after_usdt,
                balance_before_nft, balance_after_nft,
                reference_id, admin_id, balance_version, created_at
            FROM commission_transaction_log
            WHERE user_id = $1
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM commission_transaction_log WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((entries, count.0))
    }

    async fn record_security_event(&self, event: NewSecurityEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_audit_log (event_type, severity, user_id, admin_id, details, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(event.event_type)
        .bind(event.severity.as_str())
        .bind(event.user_id)
        .bind(event.admin_id)
        .bind(&event.details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_security_events(&self, limit: u32) -> StoreResult<Vec<SecurityAuditLogEntry>> {
        let events = sqlx::query_as::<_, SecurityAuditLogEntry>(
            r#"
            SELECT id, event_type, severity, user_id, admin_id, details, created_at
            FROM security_audit_log
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn insert_withdrawal(&self, withdrawal: NewWithdrawal) -> StoreResult<WithdrawalRequest> {
        let mut tx = self.pool.begin().await?;

        // 같은 사용자의 동시 신청 직렬화
        let available: Option<(Decimal, i64)> = sqlx::query_as(
            r#"
            SELECT available_usdt_balance, available_nft_balance
            FROM commission_balances
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(withdrawal.user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (available_usdt, available_nft) = available.unwrap_or((Decimal::ZERO, 0));

        let pending: (Decimal, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(requested_amount_usdt), 0),
                COALESCE(SUM(requested_quantity_nft), 0)::BIGINT
            FROM commission_withdrawals
            WHERE user_id = $1 AND status = 'pending'
            "#,
        )
        .bind(withdrawal.user_id)
        .fetch_one(&mut *tx)
        .await?;

        match withdrawal.withdrawal_type {
            WithdrawalType::Usdt => {
                let free = available_usdt - pending.0;
                if free < withdrawal.requested_amount_usdt {
                    return Err(StoreError::InsufficientFunds {
                        available: free.to_string(),
                        requested: withdrawal.requested_amount_usdt.to_string(),
                    });
                }
            }
            WithdrawalType::Nft => {
                let free = available_nft - pending.1;
                if free < withdrawal.requested_quantity_nft {
                    return Err(StoreError::InsufficientFunds {
                        available: free.to_string(),
                        requested: withdrawal.requested_quantity_nft.to_string(),
                    });
                }
            }
        }

        let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
            r#"
            INSERT INTO commission_withdrawals (
                id, user_id, withdrawal_type, requested_amount_usdt, requested_quantity_nft,
                wallet_address, status, scheduled_for_date, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, NOW())
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(withdrawal.user_id)
        .bind(withdrawal.withdrawal_type.as_str())
        .bind(withdrawal.requested_amount_usdt)
        .bind(withdrawal.requested_quantity_nft)
        .bind(&withdrawal.wallet_address)
        .bind(withdrawal.scheduled_for_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        withdrawal_from_row(row)
    }

    async fn find_withdrawal(&self, id: Uuid) -> StoreResult<Option<WithdrawalRequest>> {
        let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
            "SELECT {} FROM commission_withdrawals WHERE id = $1",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(withdrawal_from_row).transpose()
    }

    async fn list_withdrawals(
        &self,
        filter: WithdrawalFilter,
        oldest_first: bool,
    ) -> StoreResult<Vec<WithdrawalRequest>> {
        let rows = sqlx::query_as::<_, WithdrawalRow>(&format!(
            r#"
            SELECT {}
            FROM commission_withdrawals
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at {}
            "#,
            WITHDRAWAL_COLUMNS,
            if oldest_first { "ASC" } else { "DESC" }
        ))
        .bind(filter.user_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(withdrawal_from_row).collect()
    }

    async fn pending_withdrawal_totals(&self, user_id: Option<UserId>) -> StoreResult<PendingTotals> {
        let totals: (Decimal, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(requested_amount_usdt), 0),
                COALESCE(SUM(requested_quantity_nft), 0)::BIGINT
            FROM commission_withdrawals
            WHERE status = 'pending' AND ($1::BIGINT IS NULL OR user_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(PendingTotals {
            usdt: totals.0,
            nft: totals.1,
        })
    }

    async fn finalize_withdrawal(
        &self,
        finalization: WithdrawalFinalization,
    ) -> StoreResult<WithdrawalRequest> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, WithdrawalRow>(&format!(
            "SELECT {} FROM commission_withdrawals WHERE id = $1 FOR UPDATE",
            WITHDRAWAL_COLUMNS
        ))
        .bind(finalization.withdrawal_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("Withdrawal".to_string()))?;
        let current = withdrawal_from_row(current)?;

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
            Self::apply_balance_write(&mut tx, write).await?;
        }

        let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
            r#"
            UPDATE commission_withdrawals SET
                status = $2,
                admin_id = $3,
                transaction_hash = $4,
                blockchain_hash = $5,
                admin_notes = $6,
                processed_at = $7
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(finalization.withdrawal_id)
        .bind(finalization.status.as_str())
        .bind(finalization.admin_id)
        .bind(&finalization.transaction_hash)
        .bind(&finalization.blockchain_hash)
        .bind(&finalization.admin_notes)
        .bind(finalization.processed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        withdrawal_from_row(row)
    }

    async fn find_referrer(&self, user_id: UserId) -> StoreResult<Option<UserId>> {
        let referrer: Option<(i64,)> =
            sqlx::query_as("SELECT referrer_id FROM referral_links WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(referrer.map(|r| r.0))
    }

    async fn link_referral(&self, user_id: UserId, referrer_id: UserId) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO referral_links (user_id, referrer_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(referrer_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidTransition(format!(
                "user {} already has a referrer",
                user_id
            )));
        }
        Ok(())
    }

    async fn insert_commissions(
        &self,
        rows: Vec<NewCommission>,
    ) -> StoreResult<Vec<ReferralCommission>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(rows.len());

        for row in rows {
            let created = sqlx::query_as::<_, CommissionRow>(&format!(
                r#"
                INSERT INTO referral_commissions (
                    id, referrer_id, referred_id, investment_id, level,
                    purchase_amount, commission_usdt, commission_nft, status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', NOW())
                ON CONFLICT (investment_id, level) DO NOTHING
                RETURNING {}
                "#,
                COMMISSION_COLUMNS
            ))
            .bind(Uuid::new_v4())
            .bind(row.referrer_id)
            .bind(row.referred_id)
            .bind(&row.investment_id)
            .bind(row.level)
            .bind(row.purchase_amount)
            .bind(row.commission_usdt)
            .bind(row.commission_nft)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(created) = created {
                inserted.push(commission_from_row(created)?);
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_commissions(&self, referrer_id: UserId) -> StoreResult<Vec<ReferralCommission>> {
        let rows = sqlx::query_as::<_, CommissionRow>(&format!(
            "SELECT {} FROM referral_commissions WHERE referrer_id = $1 ORDER BY created_at DESC",
            COMMISSION_COLUMNS
        ))
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(commission_from_row).collect()
    }

    async fn mark_commissions_paid(
        &self,
        scope: ActivationScope,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<Vec<UserId>> {
        let investment_id = match &scope {
            ActivationScope::All => None,
            ActivationScope::Investment(id) => Some(id.as_str()),
        };

        let referrers: Vec<(i64,)> = sqlx::query_as(
            r#"
            UPDATE referral_commissions
            SET status = 'paid', paid_at = $1
            WHERE status = 'pending' AND ($2::TEXT IS NULL OR investment_id = $2)
            RETURNING referrer_id
            "#,
        )
        .bind(paid_at)
        .bind(investment_id)
        .fetch_all(&self.pool)
        .await?;

        let mut ids: Vec<UserId> = referrers.into_iter().map(|r| r.0).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn cancel_commissions(&self, investment_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE referral_commissions
            SET status = 'cancelled'
            WHERE investment_id = $1 AND status = 'pending'
            "#,
        )
        .bind(investment_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commission_totals(&self, referrer_id: UserId) -> StoreResult<CommissionTotals> {
        let rows: Vec<(String, Decimal, i64)> = sqlx::query_as(
            r#"
            SELECT status, COALESCE(SUM(commission_usdt), 0), COALESCE(SUM(commission_nft), 0)::BIGINT
            FROM referral_commissions
            WHERE referrer_id = $1
            GROUP BY status
            "#,
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        let mut totals = CommissionTotals::default();
        for (status, usdt, nft) in rows {
            match status.parse::<CommissionStatus>().map_err(StoreError::Corrupt)? {
                CommissionStatus::Paid => {
                    totals.paid_usdt = usdt;
                    totals.paid_nft = nft;
                }
                CommissionStatus::Pending => {
                    totals.pending_usdt = usdt;
                    totals.pending_nft = nft;
                }
                CommissionStatus::Cancelled => {}
            }
        }
        Ok(totals)
    }

    async fn list_plans(&self) -> StoreResult<Vec<InvestmentPlan>> {
        let plans = sqlx::query_as::<_, InvestmentPlan>(
            "SELECT id, name, price_usdt, shares, created_at FROM investment_plans ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }

    async fn insert_plan(&self, plan: NewPlan) -> StoreResult<InvestmentPlan> {
        let plan = sqlx::query_as::<_, InvestmentPlan>(
            r#"
            INSERT INTO investment_plans (name, price_usdt, shares, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, name, price_usdt, shares, created_at
            "#,
        )
        .bind(&plan.name)
        .bind(plan.price_usdt)
        .bind(plan.shares)
        .fetch_one(&self.pool)
        .await?;

        Ok(plan)
    }

    async fn delete_duplicate_plans(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM investment_plans p
            USING investment_plans q
            WHERE LOWER(TRIM(p.name)) = LOWER(TRIM(q.name))
              AND p.id > q.id
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
