use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Role, User};

/// Session claims. The token carries a snapshot of the profile so request
/// handling never re-reads the users table; the staleness bound is the token
/// lifetime, and profile updates re-issue the token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User id
    pub role: String,
    pub name: String,
    pub email: String,
    pub exp: usize, // Expiration time
}

/// Authenticated caller, decoded once per request by the middleware and
/// attached to request extensions.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
}

pub fn create_token(user: &User, jwt_secret: &str) -> Result<String, ApiError> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(24))
        .ok_or_else(|| ApiError::Internal("Clock overflow computing expiry".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<Claims, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;
    Ok(token_data.claims)
}

/// Pulls the session token from the `Authorization: Bearer` header, falling
/// back to the `session` cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(s) = value.to_str() {
            if let Some(token) = s.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|c| c.strip_prefix("session="))
        .map(str::to_string)
}

/// Resolves the caller from request headers, or `Unauthorized`.
pub fn authenticate_request(headers: &HeaderMap, jwt_secret: &str) -> Result<CurrentUser, ApiError> {
    let token = extract_token(headers).ok_or(ApiError::Unauthorized)?;
    let claims = validate_token(&token, jwt_secret)?;

    let id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;
    let role = Role::parse(&claims.role).ok_or(ApiError::Unauthorized)?;

    Ok(CurrentUser {
        id,
        role,
        name: claims.name,
        email: claims.email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::NaiveDateTime;

    fn test_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "jo@example.com".to_string(),
            password_hash: String::new(),
            salt: String::new(),
            name: "Jo".to_string(),
            role: role.as_str().to_string(),
            farm_name: None,
            specialization: None,
            farm_size: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let user = test_user(Role::Farmer);
        let token = create_token(&user, "secret").unwrap();
        let claims = validate_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "farmer");
        assert_eq!(claims.email, "jo@example.com");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let user = test_user(Role::Customer);
        let token = create_token(&user, "secret").unwrap();
        assert!(validate_token(&token, "other").is_err());
    }

    #[test]
    fn test_extract_token_bearer_and_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_token(&headers), Some("abc".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=xyz"),
        );
        assert_eq!(extract_token(&headers), Some("xyz".to_string()));

        assert_eq!(extract_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_authenticate_request_resolves_role() {
        let user = test_user(Role::Customer);
        let token = create_token(&user, "secret").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        let current = authenticate_request(&headers, "secret").unwrap();
        assert_eq!(current.id, user.id);
        assert_eq!(current.role, Role::Customer);
    }
}
