//! Balance integrity hashing
//!
//! 해시 입력 (canonical form):
//!
//! ```text
//! sha256( secret | domain | user_id | earned_usdt | earned_nft | avail_usdt
//!         | avail_nft | withdrawn_usdt | redeemed_nft | version )
//! ```
//!
//! Decimal 은 `normalize()` 후 문자열화한다. NUMERIC(20, 6) 에서 읽으면
//! `12.000000`, 메모리에서는 `12` 이므로 scale 차이로 해시가 바뀌면 안 됨.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::db::{BalanceAmounts, BalanceVerification, UserBalance, UserId};

const PRIMARY_DOMAIN: &str = "balance";
const VERIFICATION_DOMAIN: &str = "verify";

pub struct IntegrityHasher {
    secret: String,
}

impl IntegrityHasher {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    fn digest(&self, domain: &str, user_id: UserId, a: &BalanceAmounts, version: i64) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.secret,
            domain,
            user_id,
            a.total_usdt_earned.normalize(),
            a.total_nft_earned,
            a.available_usdt.normalize(),
            a.available_nft,
            a.total_usdt_withdrawn.normalize(),
            a.total_nft_redeemed,
            version,
        );
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    pub fn balance_hash(&self, user_id: UserId, amounts: &BalanceAmounts, version: i64) -> String {
        self.digest(PRIMARY_DOMAIN, user_id, amounts, version)
    }

    pub fn verification_hash(&self, user_id: UserId, amounts: &BalanceAmounts, version: i64) -> String {
        self.digest(VERIFICATION_DOMAIN, user_id, amounts, version)
    }

    /// primary / verification 행 교차 검증
    ///
    /// 실패한 검사 항목을 모두 모아 반환 (비어 있으면 정상)
    pub fn check(
        &self,
        user_id: UserId,
        primary: Option<&UserBalance>,
        mirror: Option<&BalanceVerification>,
    ) -> Vec<String> {
        let mut failures = Vec::new();

        let (primary, mirror) = match (primary, mirror) {
            (None, None) => return failures,
            (Some(_), None) => {
                failures.push("verification row missing".to_string());
                return failures;
            }
            (None, Some(_)) => {
                failures.push("primary row missing while verification row exists".to_string());
                return failures;
            }
            (Some(p), Some(m)) => (p, m),
        };

        let amounts = primary.amounts();
        if self.balance_hash(user_id, &amounts, primary.version) != primary.balance_hash {
            failures.push("primary hash mismatch".to_string());
        }
        if mirror.version != primary.version {
            failures.push(format!(
                "version diverged (primary {}, verification {})",
                primary.version, mirror.version
            ));
        }
        if mirror.amounts() != amounts {
            failures.push("mirrored amounts diverged".to_string());
        }
        if self.verification_hash(user_id, &mirror.amounts(), mirror.version) != mirror.verification_hash {
            failures.push("verification hash mismatch".to_string());
        }
        if !amounts.is_consistent() {
            failures.push("available != earned - withdrawn".to_string());
        }
        if amounts.has_negative() {
            failures.push("negative amount".to_string());
        }

        failures
    }
}

/// 무결성 검사 결과
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub user_id: UserId,
    pub valid: bool,
    pub version: i64,
    pub failures: Vec<String>,
    pub checked_at: DateTime<Utc>,
}
