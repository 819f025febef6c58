use axum::{extract::State, Extension, Json};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::{create_token, CurrentUser};
use crate::db;
use crate::error::ApiError;
use crate::models::{NewUser, Role, User};
use crate::schema::users;
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: String,
    pub farm_name: Option<String>,
    pub specialization: Option<String>,
    pub farm_size: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub farm_name: Option<String>,
    pub specialization: Option<String>,
    pub farm_size: Option<String>,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub farm_name: Option<String>,
    pub specialization: Option<String>,
    pub farm_size: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: ProfileResponse,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        ProfileResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            farm_name: user.farm_name,
            specialization: user.specialization,
            farm_size: user.farm_size,
        }
    }
}

fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Farm profile fields exist only on farmer accounts. A downgrade to
/// customer drops them.
fn farm_fields_for_role(
    role: Role,
    farm_name: Option<String>,
    specialization: Option<String>,
    farm_size: Option<String>,
) -> (Option<String>, Option<String>, Option<String>) {
    match role {
        Role::Farmer => (farm_name, specialization, farm_size),
        Role::Customer => (None, None, None),
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if !req.email.contains('@') {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    let role = Role::parse(&req.role)
        .ok_or_else(|| ApiError::Validation(format!("Unknown role: {}", req.role)))?;

    let mut conn = db::establish_connection()?;

    let existing = users::table
        .filter(users::email.eq(&req.email))
        .first::<User>(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let salt = Uuid::new_v4().to_string();
    let (farm_name, specialization, farm_size) =
        farm_fields_for_role(role, req.farm_name, req.specialization, req.farm_size);
    let now = Utc::now().naive_utc();
    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: req.email,
        password_hash: hash_password(&req.password, &salt),
        salt,
        name: req.name,
        role: role.as_str().to_string(),
        farm_name,
        specialization,
        farm_size,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)?;

    let user = users::table.find(new_user.id).first::<User>(&mut conn)?;
    info!("Registered {} account {}", user.role, user.id);

    let token = create_token(&user, &state.config.jwt_secret)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let mut conn = db::establish_connection()?;

    let user = users::table
        .filter(users::email.eq(&req.email))
        .first::<User>(&mut conn)
        .optional()?
        .ok_or(ApiError::Unauthorized)?;

    if hash_password(&req.password, &user.salt) != user.password_hash {
        return Err(ApiError::Unauthorized);
    }

    info!("User {} logged in", user.id);
    let token = create_token(&user, &state.config.jwt_secret)?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

pub async fn get_profile(
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let mut conn = db::establish_connection()?;
    let user = users::table
        .find(current.id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(user.into()))
}

/// Updates profile fields and re-issues the session token so the embedded
/// snapshot stays current.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let mut conn = db::establish_connection()?;

    let user = users::table
        .find(current.id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let role = match &req.role {
        Some(r) => Role::parse(r)
            .ok_or_else(|| ApiError::Validation(format!("Unknown role: {}", r)))?,
        None => Role::parse(&user.role)
            .ok_or_else(|| ApiError::Internal(format!("Corrupt role on user {}", user.id)))?,
    };

    let (farm_name, specialization, farm_size) = farm_fields_for_role(
        role,
        req.farm_name.or(user.farm_name),
        req.specialization.or(user.specialization),
        req.farm_size.or(user.farm_size),
    );

    diesel::update(users::table.find(current.id))
        .set((
            users::name.eq(req.name.unwrap_or(user.name)),
            users::role.eq(role.as_str()),
            users::farm_name.eq(farm_name),
            users::specialization.eq(specialization),
            users::farm_size.eq(farm_size),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let updated = users::table.find(current.id).first::<User>(&mut conn)?;
    info!("Updated profile for user {}", updated.id);

    let token = create_token(&updated, &state.config.jwt_secret)?;
    Ok(Json(AuthResponse {
        token,
        user: updated.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("hunter22", "salt-a");
        let b = hash_password("hunter22", "salt-b");
        assert_ne!(a, b);
        assert_eq!(a, hash_password("hunter22", "salt-a"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_downgrade_clears_farm_fields() {
        let (name, spec, size) = farm_fields_for_role(
            Role::Customer,
            Some("Green Acres".to_string()),
            Some("dairy".to_string()),
            Some("12ha".to_string()),
        );
        assert!(name.is_none() && spec.is_none() && size.is_none());

        let (name, _, _) = farm_fields_for_role(
            Role::Farmer,
            Some("Green Acres".to_string()),
            None,
            None,
        );
        assert_eq!(name.as_deref(), Some("Green Acres"));
    }
}
