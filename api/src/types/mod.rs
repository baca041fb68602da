//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 타입 정의

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// USDT 금액 소수점 자리수 (NUMERIC(20, 6)와 일치)
pub const USDT_SCALE: u32 = 6;

/// API 응답 래퍼
///
/// 프론트엔드가 기대하는 `{ success, data, message }` 형태
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

/// 지갑 주소 타입 (EVM 형식, lowercase 저장)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(addr: &str) -> Result<Self, String> {
        let addr = addr.trim().to_lowercase();
        if addr.starts_with("0x")
            && addr.len() == 42
            && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
        {
            Ok(Self(addr))
        } else {
            Err("Invalid wallet address format".to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// USDT 금액을 저장 정밀도로 절사
///
/// 반올림하지 않음: 커미션이 원금 비율을 넘지 않도록
pub fn truncate_usdt(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(USDT_SCALE, RoundingStrategy::ToZero)
}

/// NUMERIC(20,6) 로 손실 없이 저장 불가한 금액인지 (후행 0 제외)
pub fn exceeds_usdt_scale(amount: Decimal) -> bool {
    amount.normalize().scale() > USDT_SCALE
}

/// 페이지네이션 정보
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_next: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        let total = total.max(0) as u64;
        Self {
            page,
            limit,
            total,
            has_next: (u64::from(page) + 1) * u64::from(limit) < total,
        }
    }
}

/// 히스토리 쿼리 파라미터
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// 페이지 (0부터 시작)
    pub page: Option<u32>,
    /// 페이지 크기 (기본 20, 최대 100)
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn resolve(&self) -> (u32, u32) {
        (self.page.unwrap_or(0), self.limit.unwrap_or(20).clamp(1, 100))
    }
}
