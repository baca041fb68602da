//! Request authentication
//!
//! - 사용자 라우트: 세션 게이트웨이가 설정한 `X-User-Id`
//! - 관리자 라우트: `Authorization: Bearer <ADMIN_API_TOKEN>` + `X-Admin-Id`
//!
//! 인증된 id 는 request extension 으로 핸들러에 전달됨.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{
    db::{AdminId, UserId},
    error::ApiError,
    AppState,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_ID_HEADER: &str = "x-admin-id";

#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[derive(Debug, Clone, Copy)]
pub struct CurrentAdmin(pub AdminId);

fn header_id(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
}

/// digest 비교 (고정 길이, 조기 종료 없음)
fn token_matches(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn require_user(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let user_id = header_id(request.headers(), USER_ID_HEADER).ok_or(ApiError::Unauthorized)?;
    request.extensions_mut().insert(CurrentUser(user_id));
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if !token_matches(token, &state.config.admin_api_token) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request with invalid token");
        return Err(ApiError::Forbidden);
    }

    let admin_id = header_id(request.headers(), ADMIN_ID_HEADER).ok_or(ApiError::Unauthorized)?;
    request.extensions_mut().insert(CurrentAdmin(admin_id));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_id_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_id(&headers, USER_ID_HEADER), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" 42 "));
        assert_eq!(header_id(&headers, USER_ID_HEADER), Some(42));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("-1"));
        assert_eq!(header_id(&headers, USER_ID_HEADER), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(header_id(&headers, USER_ID_HEADER), None);
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("secret-token", "secret-token"));
        assert!(!token_matches("secret-token", "secret-tokem"));
        assert!(!token_matches("", "secret-token"));
    }
}
