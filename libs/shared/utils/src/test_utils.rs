use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, ROLE_ADMIN, ROLE_DOCTOR, ROLE_PATIENT};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", ROLE_PATIENT)
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, ROLE_DOCTOR)
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, ROLE_PATIENT)
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, ROLE_ADMIN)
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).expect("test user ids are UUIDs")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "aud": "authenticated",
            "iat": now.timestamp(),
            "exp": exp.timestamp().max(0)
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    pub fn bearer(user: &TestUser, config: &TestConfig) -> String {
        format!("Bearer {}", Self::create_test_token(user, &config.jwt_secret, None))
    }
}

/// Canned PostgREST payloads for the collaborator tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_profile_response(doctor_id: &str, is_public: bool) -> serde_json::Value {
        json!([{
            "doctor_user_id": doctor_id,
            "is_public": is_public,
            "display_name": "Dr. Test",
            "specialties": ["Psychotherapy"]
        }])
    }

    pub fn doctor_application_response(doctor_id: &str, status: &str) -> serde_json::Value {
        json!([{
            "doctor_user_id": doctor_id,
            "status": status
        }])
    }

    pub fn user_response(user_id: &str, status: &str) -> serde_json::Value {
        json!([{
            "id": user_id,
            "status": status
        }])
    }

    pub fn notification_response(user_id: &str, event_type: &str) -> serde_json::Value {
        json!([{
            "id": Uuid::new_v4(),
            "user_id": user_id,
            "type": event_type,
            "is_read": false,
            "created_at": "2026-01-01T00:00:00Z"
        }])
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(app_config.is_configured());
        assert_eq!(app_config.availability_max_range_days, 60);
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor("doc@example.com");
        let user_model = user.to_user();

        assert!(user_model.is_doctor());
        assert_eq!(user_model.id, user.id);
        assert_eq!(user_model.user_id().unwrap(), user.uuid());
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        assert_eq!(token.split('.').count(), 3);
    }
}
