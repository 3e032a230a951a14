use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const ROLE_DOCTOR: &str = "doctor";
pub const ROLE_PATIENT: &str = "patient";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Application role: the `role` claim unless it is the generic Supabase
    /// `authenticated` marker, in which case `app_metadata.role` is used.
    pub fn app_role(&self) -> Option<String> {
        let from_metadata = self
            .app_metadata
            .as_ref()
            .and_then(|meta| meta.get("role"))
            .and_then(|role| role.as_str())
            .map(str::to_string);

        match self.role.as_deref() {
            Some("authenticated") | None => from_metadata.or_else(|| self.role.clone()),
            Some(role) => Some(role.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn is_doctor(&self) -> bool {
        self.has_role(ROLE_DOCTOR)
    }

    pub fn is_patient(&self) -> bool {
        self.has_role(ROLE_PATIENT)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    /// Subject id as a UUID; every account id in the store is a UUID.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.id)
            .map_err(|_| AppError::BadRequest("Invalid user ID".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(role: Option<&str>, app_metadata: Option<serde_json::Value>) -> JwtClaims {
        JwtClaims {
            sub: Uuid::new_v4().to_string(),
            exp: None,
            email: None,
            role: role.map(str::to_string),
            app_metadata,
            user_metadata: None,
            aud: None,
            iat: None,
        }
    }

    #[test]
    fn test_explicit_role_wins() {
        let c = claims(Some("doctor"), Some(json!({"role": "admin"})));
        assert_eq!(c.app_role().as_deref(), Some("doctor"));
    }

    #[test]
    fn test_authenticated_role_falls_back_to_app_metadata() {
        let c = claims(Some("authenticated"), Some(json!({"role": "patient"})));
        assert_eq!(c.app_role().as_deref(), Some("patient"));

        let bare = claims(Some("authenticated"), None);
        assert_eq!(bare.app_role().as_deref(), Some("authenticated"));
    }

    #[test]
    fn test_user_id_parsing() {
        let id = Uuid::new_v4();
        let user = User {
            id: id.to_string(),
            email: None,
            role: Some(ROLE_PATIENT.to_string()),
            metadata: None,
            created_at: None,
        };
        assert_eq!(user.user_id().ok(), Some(id));
        assert!(user.is_patient());
        assert!(!user.is_doctor());

        let broken = User { id: "not-a-uuid".to_string(), ..user };
        assert!(broken.user_id().is_err());
    }
}
