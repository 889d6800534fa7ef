use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::Config,
    database::{MongoDB, USERS},
    models::{SecurityAction, User, UserInfo},
    services::{
        parse_object_id,
        security_log_service::{self, ClientInfo},
    },
    utils::{
        error::AppError,
        password::{hash_password, verify_password},
        time::{bson_from_chrono, chrono_from_bson},
    },
};

pub const MAX_LOGIN_ATTEMPTS: i32 = 5;
pub const LOCK_MINUTES: i64 = 15;

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user _id, hex
    pub username: String,
    pub rank: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    #[serde(rename = "isLinked")]
    pub is_linked: bool,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<ObjectId, AppError> {
        parse_object_id(&self.sub, "user")
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: Option<String>,
}

/// `username` may also hold the account's email address.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: UserInfo,
}

pub fn generate_jwt(config: &Config, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id_hex(),
        username: user.username.clone(),
        rank: user.web_rank.as_str().to_string(),
        is_admin: user.web_rank.is_admin(),
        is_linked: user.minecraft.is_linked(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(config.jwt_expire_hours)).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: config.jwt_audience.clone(),
        iss: config.jwt_issuer.clone(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

pub fn verify_token(config: &Config, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.jwt_audience.as_str()]);

    let mut issuers = HashSet::new();
    issuers.insert(config.jwt_issuer.clone());
    validation.iss = Some(issuers);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        log::debug!("Token rejected: {}", e);
        AppError::unauthorized("Not authorized to access this route")
    })
}

pub fn is_valid_username(username: &str) -> bool {
    (3..=20).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Loose shape check: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Returns the trimmed username and lowercased email.
pub fn validate_registration(request: &RegisterRequest) -> Result<(String, String), AppError> {
    let username = request.username.trim();
    if !(3..=20).contains(&username.len()) {
        return Err(AppError::invalid("Username must be between 3 and 20 characters"));
    }
    if !is_valid_username(username) {
        return Err(AppError::invalid(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    let email = request.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::invalid("Please provide a valid email address"));
    }

    if request.password.len() < 6 {
        return Err(AppError::invalid("Password must be at least 6 characters long"));
    }
    if let Some(confirm) = &request.confirm_password {
        if confirm != &request.password {
            return Err(AppError::invalid("Passwords do not match"));
        }
    }

    Ok((username.to_string(), email))
}

// User registration
pub async fn register(
    db: &MongoDB,
    config: &Config,
    request: &RegisterRequest,
) -> Result<AuthResponse, AppError> {
    let (username, email) = validate_registration(request)?;
    let collection = db.collection::<User>(USERS);

    if collection.find_one(doc! { "username": &username }).await?.is_some() {
        return Err(AppError::invalid("Username already exists"));
    }
    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::invalid("Email already exists"));
    }

    let hashed = hash_password(request.password.clone()).await?;
    let mut user = User::new(username, email, hashed);

    let result = collection.insert_one(&user).await?;
    user.id = result.inserted_id.as_object_id();

    let token = generate_jwt(config, &user)?;
    log::info!("✅ User registered successfully: {}", user.username);

    Ok(AuthResponse {
        success: true,
        token,
        user: UserInfo::from(&user),
    })
}

// User login
pub async fn login(
    db: &MongoDB,
    config: &Config,
    request: &LoginRequest,
    client: &ClientInfo,
) -> Result<AuthResponse, AppError> {
    let identifier = request.username.trim();
    if identifier.is_empty() || request.password.is_empty() {
        return Err(AppError::invalid("Please provide username and password"));
    }

    let collection = db.collection::<User>(USERS);
    let filter = doc! {
        "$or": [
            { "username": identifier },
            { "email": identifier.to_lowercase() },
        ]
    };

    let Some(user) = collection.find_one(filter).await? else {
        security_log_service::record(
            db,
            None,
            SecurityAction::LoginFailed,
            client,
            Some(doc! { "username": identifier, "reason": "user_not_found" }),
        )
        .await;
        return Err(AppError::unauthorized("Invalid credentials"));
    };
    let user_id = user
        .id
        .ok_or_else(|| AppError::Internal("User document without _id".into()))?;

    if let Err(locked) = ensure_unlocked(user.lock_until.map(chrono_from_bson), Utc::now()) {
        security_log_service::record(
            db,
            Some(user_id),
            SecurityAction::LoginFailed,
            client,
            Some(doc! { "reason": "account_locked" }),
        )
        .await;
        return Err(locked);
    }

    if !verify_password(request.password.clone(), user.password.clone()).await? {
        let attempts = record_failed_attempt(db, user_id).await?;
        security_log_service::record(
            db,
            Some(user_id),
            SecurityAction::LoginFailed,
            client,
            Some(doc! { "attempts": attempts, "locked": attempts >= MAX_LOGIN_ATTEMPTS }),
        )
        .await;
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let user = collection
        .find_one_and_update(
            doc! { "_id": user_id },
            doc! {
                "$set": { "loginAttempts": 0, "lastLogin": mongodb::bson::DateTime::now() },
                "$unset": { "lockUntil": "" },
            },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    security_log_service::record(db, Some(user_id), SecurityAction::Login, client, None).await;

    let token = generate_jwt(config, &user)?;
    Ok(AuthResponse {
        success: true,
        token,
        user: UserInfo::from(&user),
    })
}

/// Rejects logins while a lock from earlier failures is still running.
pub fn ensure_unlocked(lock_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), AppError> {
    match lock_until {
        Some(until) if until > now => Err(AppError::Locked {
            message: "Account is temporarily locked due to too many failed login attempts"
                .to_string(),
            until,
        }),
        _ => Ok(()),
    }
}

/// When the failure count has reached the limit, the time the lock lifts.
pub fn lock_deadline(attempts: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (attempts >= MAX_LOGIN_ATTEMPTS).then(|| now + Duration::minutes(LOCK_MINUTES))
}

/// Bumps the failure counter and locks the account once it reaches the limit.
async fn record_failed_attempt(db: &MongoDB, user_id: ObjectId) -> Result<i32, AppError> {
    let collection = db.collection::<User>(USERS);
    let updated = collection
        .find_one_and_update(doc! { "_id": user_id }, doc! { "$inc": { "loginAttempts": 1 } })
        .return_document(ReturnDocument::After)
        .await?;
    let attempts = updated.map(|u| u.login_attempts).unwrap_or(0);

    if let Some(until) = lock_deadline(attempts, Utc::now()) {
        collection
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "lockUntil": bson_from_chrono(until) } },
            )
            .await?;
        log::warn!("🔒 Account {} locked for {} minutes", user_id, LOCK_MINUTES);
    }

    Ok(attempts)
}

pub async fn find_user(db: &MongoDB, user_id: &ObjectId) -> Result<User, AppError> {
    db.collection::<User>(USERS)
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

// Get current user
pub async fn get_current_user(db: &MongoDB, claims: &Claims) -> Result<UserInfo, AppError> {
    let user = find_user(db, &claims.user_id()?).await?;
    Ok(UserInfo::from(&user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use rstest::rstest;

    fn user() -> User {
        let mut user = User::new("steve".into(), "steve@example.com".into(), "hash".into());
        user.id = Some(ObjectId::new());
        user
    }

    fn register_request(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            confirm_password: None,
        }
    }

    #[test]
    fn jwt_round_trip() {
        let config = test_config();
        let user = user();
        let token = generate_jwt(&config, &user).unwrap();
        let claims = verify_token(&config, &token).unwrap();

        assert_eq!(claims.sub, user.id_hex());
        assert_eq!(claims.username, "steve");
        assert_eq!(claims.rank, "user");
        assert!(!claims.is_admin);
        assert!(!claims.is_linked);
        assert_eq!(claims.user_id().unwrap(), user.id.unwrap());
    }

    #[test]
    fn jwt_with_wrong_secret_is_rejected() {
        let config = test_config();
        let token = generate_jwt(&config, &user()).unwrap();

        let mut other = test_config();
        other.jwt_secret = "another-secret".into();
        assert!(matches!(verify_token(&other, &token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn jwt_with_wrong_audience_is_rejected() {
        let config = test_config();
        let token = generate_jwt(&config, &user()).unwrap();

        let mut other = test_config();
        other.jwt_audience = "someone-else".into();
        assert!(verify_token(&other, &token).is_err());
    }

    #[test]
    fn linked_admin_claims() {
        let mut user = user();
        user.web_rank = crate::models::WebRank::Owner;
        user.minecraft.linked = true;
        user.minecraft.mc_uuid = Some("069a79f4-44e9-4726-a5be-fca90e38aaf5".into());

        let config = test_config();
        let claims = verify_token(&config, &generate_jwt(&config, &user).unwrap()).unwrap();
        assert!(claims.is_admin);
        assert!(claims.is_linked);
        assert_eq!(claims.rank, "owner");
    }

    #[rstest]
    #[case("steve", "steve@example.com", "secret1", true)]
    #[case("st", "steve@example.com", "secret1", false)]
    #[case("steve!", "steve@example.com", "secret1", false)]
    #[case("steve", "not-an-email", "secret1", false)]
    #[case("steve", "a@b", "secret1", false)]
    #[case("steve", "steve@example.com", "short", false)]
    fn registration_validation(
        #[case] username: &str,
        #[case] email: &str,
        #[case] password: &str,
        #[case] ok: bool,
    ) {
        let result = validate_registration(&register_request(username, email, password));
        assert_eq!(result.is_ok(), ok, "{:?}", result);
    }

    #[test]
    fn registration_lowercases_email() {
        let (username, email) =
            validate_registration(&register_request(" Steve ", "Steve@Example.COM", "secret1"))
                .unwrap();
        assert_eq!(username, "Steve");
        assert_eq!(email, "steve@example.com");
    }

    #[test]
    fn mismatched_confirmation_is_rejected() {
        let mut request = register_request("steve", "steve@example.com", "secret1");
        request.confirm_password = Some("secret2".into());
        let err = validate_registration(&request).unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
    }

    #[test]
    fn login_accepts_email_field() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email":"steve@example.com","password":"x"}"#).unwrap();
        assert_eq!(request.username, "steve@example.com");
    }

    #[rstest]
    #[case(1, false)]
    #[case(4, false)]
    #[case(5, true)]
    #[case(6, true)]
    fn fifth_failure_locks_for_fifteen_minutes(#[case] attempts: i32, #[case] locks: bool) {
        let now = Utc::now();
        let deadline = lock_deadline(attempts, now);
        assert_eq!(deadline.is_some(), locks);
        if let Some(until) = deadline {
            assert_eq!(until - now, Duration::minutes(15));
        }
    }

    #[test]
    fn running_lock_rejects_with_expiry() {
        let now = Utc::now();
        let until = now + Duration::minutes(10);

        match ensure_unlocked(Some(until), now) {
            Err(AppError::Locked { until: reported, .. }) => assert_eq!(reported, until),
            other => panic!("expected a lock, got {:?}", other),
        }
    }

    #[rstest]
    #[case(None)]
    #[case(Some(Duration::minutes(-1)))]
    #[case(Some(Duration::zero()))]
    fn expired_or_missing_lock_allows_login(#[case] offset: Option<Duration>) {
        let now = Utc::now();
        assert!(ensure_unlocked(offset.map(|d| now + d), now).is_ok());
    }
}
