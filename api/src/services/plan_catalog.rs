//! Investment plan catalog

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    db::{InvestmentPlan, LedgerRepository, NewPlan},
    error::ApiError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted: u64,
    pub remaining: usize,
}

pub struct PlanCatalog {
    repo: Arc<dyn LedgerRepository>,
}

impl PlanCatalog {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub async fn list_plans(&self) -> Result<Vec<InvestmentPlan>, ApiError> {
        Ok(self.repo.list_plans().await?)
    }

    pub async fn create_plan(
        &self,
        name: &str,
        price_usdt: Decimal,
        shares: i64,
    ) -> Result<InvestmentPlan, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::ValidationError("plan name is required".to_string()));
        }
        if price_usdt <= Decimal::ZERO || shares <= 0 {
            return Err(ApiError::ValidationError(
                "plan price and shares must be positive".to_string(),
            ));
        }

        let plan = self
            .repo
            .insert_plan(NewPlan {
                name: name.to_string(),
                price_usdt,
                shares,
            })
            .await?;
        tracing::info!(plan_id = plan.id, name = %plan.name, "Investment plan created");
        Ok(plan)
    }

    /// 이름 중복 플랜 정리 (가장 작은 id 만 유지, 재실행 시 0 건)
    pub async fn cleanup_duplicate_plans(&self) -> Result<CleanupReport, ApiError> {
        let deleted = self.repo.delete_duplicate_plans().await?;
        let remaining = self.repo.list_plans().await?.len();
        tracing::info!(deleted, remaining, "Duplicate plans cleaned up");
        Ok(CleanupReport { deleted, remaining })
    }
}
