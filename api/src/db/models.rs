//! Database Models
//!
//! Ledger rows (balances, mirror, log), commission and withdrawal records.
//! Status columns are stored as TEXT and converted to enums at the db boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub type UserId = i64;
pub type AdminId = i64;

// ============ Balance ============

/// 잔액 수치 묶음 (primary / verification 테이블 공통)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceAmounts {
    pub total_usdt_earned: Decimal,
    pub total_nft_earned: i64,
    pub available_usdt: Decimal,
    pub available_nft: i64,
    pub total_usdt_withdrawn: Decimal,
    pub total_nft_redeemed: i64,
}

impl BalanceAmounts {
    /// available = earned − withdrawn (USDT, NFT 각각)
    pub fn is_consistent(&self) -> bool {
        self.available_usdt == self.total_usdt_earned - self.total_usdt_withdrawn
            && self.available_nft == self.total_nft_earned - self.total_nft_redeemed
    }

    pub fn has_negative(&self) -> bool {
        self.total_usdt_earned < Decimal::ZERO
            || self.available_usdt < Decimal::ZERO
            || self.total_usdt_withdrawn < Decimal::ZERO
            || self.total_nft_earned < 0
            || self.available_nft < 0
            || self.total_nft_redeemed < 0
    }
}

/// 사용자 커미션 잔액 (primary 테이블)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserBalance {
    pub user_id: UserId,
    pub total_usdt_earned: Decimal,
    pub total_nft_earned: i64,
    pub available_usdt_balance: Decimal,
    pub available_nft_balance: i64,
    pub total_usdt_withdrawn: Decimal,
    pub total_nft_redeemed: i64,
    /// 마지막 변경을 일으킨 참조 (커미션 id, 출금 id 등)
    pub last_reference_id: Option<String>,
    pub last_admin_id: Option<AdminId>,
    /// 단조 증가 버전 (행이 없으면 0)
    pub version: i64,
    #[serde(skip_serializing)]
    pub balance_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// 아직 행이 없는 사용자의 잔액
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            total_usdt_earned: Decimal::ZERO,
            total_nft_earned: 0,
            available_usdt_balance: Decimal::ZERO,
            available_nft_balance: 0,
            total_usdt_withdrawn: Decimal::ZERO,
            total_nft_redeemed: 0,
            last_reference_id: None,
            last_admin_id: None,
            version: 0,
            balance_hash: String::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn amounts(&self) -> BalanceAmounts {
        BalanceAmounts {
            total_usdt_earned: self.total_usdt_earned,
            total_nft_earned: self.total_nft_earned,
            available_usdt: self.available_usdt_balance,
            available_nft: self.available_nft_balance,
            total_usdt_withdrawn: self.total_usdt_withdrawn,
            total_nft_redeemed: self.total_nft_redeemed,
        }
    }
}

/// 잔액 미러 (verification 테이블)
#[derive(Debug, Clone, FromRow)]
pub struct BalanceVerification {
    pub user_id: UserId,
    pub total_usdt_earned: Decimal,
    pub total_nft_earned: i64,
    pub available_usdt_balance: Decimal,
    pub available_nft_balance: i64,
    pub total_usdt_withdrawn: Decimal,
    pub total_nft_redeemed: i64,
    pub version: i64,
    pub verification_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl BalanceVerification {
    pub fn amounts(&self) -> BalanceAmounts {
        BalanceAmounts {
            total_usdt_earned: self.total_usdt_earned,
            total_nft_earned: self.total_nft_earned,
            available_usdt: self.available_usdt_balance,
            available_nft: self.available_nft_balance,
            total_usdt_withdrawn: self.total_usdt_withdrawn,
            total_nft_redeemed: self.total_nft_redeemed,
        }
    }
}

/// 잔액 변경 종류 (transaction log)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    CommissionCredit,
    BalanceAdjustment,
    Withdrawal,
    Recompute,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::CommissionCredit => "commission_credit",
            TransactionType::BalanceAdjustment => "balance_adjustment",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Recompute => "recompute",
        }
    }
}

/// 원자적 잔액 쓰기 명령
///
/// primary + verification + log 가 하나의 트랜잭션으로 기록됨.
/// 저장된 version 이 `expected_version` 과 다르면 충돌.
#[derive(Debug, Clone)]
pub struct BalanceWrite {
    pub user_id: UserId,
    pub amounts: BalanceAmounts,
    pub expected_version: i64,
    pub balance_hash: String,
    pub verification_hash: String,
    pub transaction_type: TransactionType,
    pub reference_id: Option<String>,
    pub admin_id: Option<AdminId>,
}

impl BalanceWrite {
    pub fn new_version(&self) -> i64 {
        self.expected_version + 1
    }
}

/// 잔액 변경 로그 (append-only)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TransactionLogEntry {
    pub id: i64,
    pub user_id: UserId,
    pub transaction_type: String,
    pub usdt_delta: Decimal,
    pub nft_delta: i64,
    pub balance_before_usdt: Decimal,
    pub balance_after_usdt: Decimal,
    pub balance_before_nft: i64,
    pub balance_after_nft: i64,
    pub reference_id: Option<String>,
    pub admin_id: Option<AdminId>,
    pub balance_version: i64,
    pub created_at: DateTime<Utc>,
}

// ============ Security audit ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub event_type: &'static str,
    pub severity: Severity,
    pub user_id: Option<UserId>,
    pub admin_id: Option<AdminId>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SecurityAuditLogEntry {
    pub id: i64,
    pub event_type: String,
    pub severity: String,
    pub user_id: Option<UserId>,
    pub admin_id: Option<AdminId>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ============ Withdrawals ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalType {
    Usdt,
    Nft,
}

impl WithdrawalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalType::Usdt => "usdt",
            WithdrawalType::Nft => "nft",
        }
    }
}

impl FromStr for WithdrawalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usdt" => Ok(WithdrawalType::Usdt),
            "nft" => Ok(WithdrawalType::Nft),
            other => Err(format!("unknown withdrawal type '{}'", other)),
        }
    }
}

/// 출금 요청 상태: pending → completed | failed (둘 다 terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WithdrawalStatus::Pending)
    }
}

impl FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "completed" => Ok(WithdrawalStatus::Completed),
            "failed" => Ok(WithdrawalStatus::Failed),
            other => Err(format!("unknown withdrawal status '{}'", other)),
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 출금 요청
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: UserId,
    pub withdrawal_type: WithdrawalType,
    pub requested_amount_usdt: Decimal,
    pub requested_quantity_nft: i64,
    pub wallet_address: String,
    pub status: WithdrawalStatus,
    pub scheduled_for_date: NaiveDate,
    pub transaction_hash: Option<String>,
    pub blockchain_hash: Option<String>,
    pub admin_id: Option<AdminId>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// DB 행 (status/type 은 TEXT)
#[derive(Debug, FromRow)]
pub(crate) struct WithdrawalRow {
    pub id: Uuid,
    pub user_id: UserId,
    pub withdrawal_type: String,
    pub requested_amount_usdt: Decimal,
    pub requested_quantity_nft: i64,
    pub wallet_address: String,
    pub status: String,
    pub scheduled_for_date: NaiveDate,
    pub transaction_hash: Option<String>,
    pub blockchain_hash: Option<String>,
    pub admin_id: Option<AdminId>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WithdrawalRow> for WithdrawalRequest {
    type Error = String;

    fn try_from(row: WithdrawalRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            withdrawal_type: row.withdrawal_type.parse()?,
            requested_amount_usdt: row.requested_amount_usdt,
            requested_quantity_nft: row.requested_quantity_nft,
            wallet_address: row.wallet_address,
            status: row.status.parse()?,
            scheduled_for_date: row.scheduled_for_date,
            transaction_hash: row.transaction_hash,
            blockchain_hash: row.blockchain_hash,
            admin_id: row.admin_id,
            admin_notes: row.admin_notes,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub user_id: UserId,
    pub withdrawal_type: WithdrawalType,
    pub requested_amount_usdt: Decimal,
    pub requested_quantity_nft: i64,
    pub wallet_address: String,
    pub scheduled_for_date: NaiveDate,
}

/// 관리자 처리 결과
///
/// `balance` 가 있으면 상태 변경과 같은 트랜잭션에서 잔액 차감
#[derive(Debug, Clone)]
pub struct WithdrawalFinalization {
    pub withdrawal_id: Uuid,
    pub admin_id: AdminId,
    pub status: WithdrawalStatus,
    pub transaction_hash: Option<String>,
    pub blockchain_hash: Option<String>,
    pub admin_notes: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub balance: Option<BalanceWrite>,
}

#[derive(Debug, Clone, Default)]
pub struct WithdrawalFilter {
    pub user_id: Option<UserId>,
    pub status: Option<WithdrawalStatus>,
}

/// 대기 중 출금 합계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingTotals {
    pub usdt: Decimal,
    pub nft: i64,
}

// ============ Referral commissions ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Paid,
    Cancelled,
}

impl FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommissionStatus::Pending),
            "paid" => Ok(CommissionStatus::Paid),
            "cancelled" => Ok(CommissionStatus::Cancelled),
            other => Err(format!("unknown commission status '{}'", other)),
        }
    }
}

/// 추천 커미션 (investment, level 당 1행)
#[derive(Debug, Clone, Serialize)]
pub struct ReferralCommission {
    pub id: Uuid,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub investment_id: String,
    pub level: i16,
    pub purchase_amount: Decimal,
    pub commission_usdt: Decimal,
    pub commission_nft: i64,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
pub(crate) struct CommissionRow {
    pub id: Uuid,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub investment_id: String,
    pub level: i16,
    pub purchase_amount: Decimal,
    pub commission_usdt: Decimal,
    pub commission_nft: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommissionRow> for ReferralCommission {
    type Error = String;

    fn try_from(row: CommissionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            referrer_id: row.referrer_id,
            referred_id: row.referred_id,
            investment_id: row.investment_id,
            level: row.level,
            purchase_amount: row.purchase_amount,
            commission_usdt: row.commission_usdt,
            commission_nft: row.commission_nft,
            status: row.status.parse()?,
            created_at: row.created_at,
            paid_at: row.paid_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewCommission {
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub investment_id: String,
    pub level: i16,
    pub purchase_amount: Decimal,
    pub commission_usdt: Decimal,
    pub commission_nft: i64,
}

/// 커미션 활성화 범위
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationScope {
    All,
    Investment(String),
}

/// 상태별 커미션 합계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommissionTotals {
    pub paid_usdt: Decimal,
    pub paid_nft: i64,
    pub pending_usdt: Decimal,
    pub pending_nft: i64,
}

// ============ Investment plans ============

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InvestmentPlan {
    pub id: i64,
    pub name: String,
    pub price_usdt: Decimal,
    pub shares: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlan {
    pub name: String,
    pub price_usdt: Decimal,
    pub shares: i64,
}

/// 플랜 이름 정규화 (중복 판정용)
pub fn plan_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amounts_consistency() {
        let amounts = BalanceAmounts {
            total_usdt_earned: Decimal::from(20),
            total_nft_earned: 3,
            available_usdt: Decimal::from(15),
            available_nft: 3,
            total_usdt_withdrawn: Decimal::from(5),
            total_nft_redeemed: 0,
        };
        assert!(amounts.is_consistent());
        assert!(!amounts.has_negative());

        let broken = BalanceAmounts { available_usdt: Decimal::from(16), ..amounts };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn test_negative_detection() {
        let amounts = BalanceAmounts {
            total_usdt_earned: Decimal::from(-1),
            ..Default::default()
        };
        assert!(amounts.has_negative());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("completed".parse::<WithdrawalStatus>(), Ok(WithdrawalStatus::Completed));
        assert!("done".parse::<WithdrawalStatus>().is_err());
        assert!(WithdrawalStatus::Failed.is_terminal());
        assert!(!WithdrawalStatus::Pending.is_terminal());
    }
}
