use assert_matches::assert_matches;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::{AvailabilityError, DoctorDirectory, SupabaseDoctorDirectory};
use shared_config::AppConfig;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn directory_for(server: &MockServer) -> SupabaseDoctorDirectory {
    let config = AppConfig {
        supabase_url: server.uri(),
        ..TestConfig::default().to_app_config()
    };
    SupabaseDoctorDirectory::new(&config)
}

async fn mount_rows(server: &MockServer, table: &str, status_filter: (&str, &str), body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/rest/v1/{}", table)))
        .and(query_param(status_filter.0, status_filter.1))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_bookable_doctor_passes_all_checks() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();

    mount_rows(&server, "doctor_profiles", ("is_public", "eq.true"),
        MockSupabaseResponses::doctor_profile_response(&doctor_id, true)).await;
    mount_rows(&server, "users", ("status", "eq.ACTIVE"),
        MockSupabaseResponses::user_response(&doctor_id, "ACTIVE")).await;
    mount_rows(&server, "doctor_applications", ("status", "eq.APPROVED"),
        MockSupabaseResponses::doctor_application_response(&doctor_id, "APPROVED")).await;

    let directory = directory_for(&server);
    let id = Uuid::parse_str(&doctor_id).unwrap();

    assert!(directory.is_public(id).await.unwrap());
    assert!(directory.ensure_bookable(id).await.is_ok());
}

#[tokio::test]
async fn test_unapproved_doctor_is_not_bookable() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4().to_string();

    mount_rows(&server, "doctor_profiles", ("is_public", "eq.true"),
        MockSupabaseResponses::doctor_profile_response(&doctor_id, true)).await;
    mount_rows(&server, "users", ("status", "eq.ACTIVE"),
        MockSupabaseResponses::user_response(&doctor_id, "ACTIVE")).await;
    mount_rows(&server, "doctor_applications", ("status", "eq.APPROVED"), serde_json::json!([])).await;

    let directory = directory_for(&server);
    let result = directory.ensure_bookable(Uuid::parse_str(&doctor_id).unwrap()).await;

    assert_matches!(result, Err(AvailabilityError::DoctorNotFound));
}

#[tokio::test]
async fn test_hidden_profile_is_not_public() {
    let server = MockServer::start().await;
    mount_rows(&server, "doctor_profiles", ("is_public", "eq.true"), serde_json::json!([])).await;

    let directory = directory_for(&server);
    let doctor_id = Uuid::new_v4();

    assert!(!directory.is_public(doctor_id).await.unwrap());
    assert_matches!(
        directory.ensure_bookable(doctor_id).await,
        Err(AvailabilityError::DoctorNotFound)
    );
}

#[tokio::test]
async fn test_directory_outage_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_profiles"))
        .respond_with(ResponseTemplate::new(503).set_body_json(
            MockSupabaseResponses::error_response("unavailable", "PGRST000"),
        ))
        .mount(&server)
        .await;

    let directory = directory_for(&server);

    assert_matches!(
        directory.is_public(Uuid::new_v4()).await,
        Err(AvailabilityError::Directory(_))
    );
}
