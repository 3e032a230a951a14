use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::AvailabilityError;

/// Doctor eligibility as seen by the public directory.
#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    /// Listed in the public directory.
    async fn is_public(&self, doctor_id: Uuid) -> Result<bool, AvailabilityError>;

    /// Public, with an approved application and an active account.
    async fn ensure_bookable(&self, doctor_id: Uuid) -> Result<(), AvailabilityError>;
}

pub struct SupabaseDoctorDirectory {
    supabase: SupabaseClient,
}

impl SupabaseDoctorDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn has_row(&self, path: String) -> Result<bool, AvailabilityError> {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AvailabilityError::Directory(e.to_string()))?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseDoctorDirectory {
    async fn is_public(&self, doctor_id: Uuid) -> Result<bool, AvailabilityError> {
        self.has_row(format!(
            "/rest/v1/doctor_profiles?doctor_user_id=eq.{}&is_public=eq.true&select=doctor_user_id",
            doctor_id
        ))
        .await
    }

    async fn ensure_bookable(&self, doctor_id: Uuid) -> Result<(), AvailabilityError> {
        if !self.is_public(doctor_id).await? {
            debug!("Doctor {} has no public profile", doctor_id);
            return Err(AvailabilityError::DoctorNotFound);
        }

        let active = self.has_row(format!(
            "/rest/v1/users?id=eq.{}&status=eq.ACTIVE&select=id",
            doctor_id
        ))
        .await?;
        if !active {
            debug!("Doctor {} is not active", doctor_id);
            return Err(AvailabilityError::DoctorNotFound);
        }

        let approved = self.has_row(format!(
            "/rest/v1/doctor_applications?doctor_user_id=eq.{}&status=eq.APPROVED&select=doctor_user_id",
            doctor_id
        ))
        .await?;
        if !approved {
            debug!("Doctor {} has no approved application", doctor_id);
            return Err(AvailabilityError::DoctorNotFound);
        }

        Ok(())
    }
}

/// Treats every doctor as listed and bookable. Used when Supabase is not
/// configured and in tests.
#[derive(Debug, Default, Clone)]
pub struct OpenDoctorDirectory;

#[async_trait]
impl DoctorDirectory for OpenDoctorDirectory {
    async fn is_public(&self, _doctor_id: Uuid) -> Result<bool, AvailabilityError> {
        Ok(true)
    }

    async fn ensure_bookable(&self, _doctor_id: Uuid) -> Result<(), AvailabilityError> {
        Ok(())
    }
}
