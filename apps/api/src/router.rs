use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, AppointmentState, Notifier};
use doctor_cell::{availability_routes, AvailabilityState, DoctorDirectory};
use shared_config::AppConfig;
use shared_database::BookingStore;

pub fn create_router(
    config: Arc<AppConfig>,
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn DoctorDirectory>,
    notifier: Arc<dyn Notifier>,
) -> Router {
    let availability_state = Arc::new(AvailabilityState {
        config: config.clone(),
        store: store.clone(),
        directory: directory.clone(),
    });

    let appointment_state = Arc::new(AppointmentState {
        config,
        store,
        directory,
        notifier,
    });

    Router::new()
        .route("/", get(|| async { "Amae scheduling API is running!" }))
        .merge(availability_routes(availability_state))
        .merge(appointment_routes(appointment_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    use appointment_cell::TracingNotifier;
    use doctor_cell::OpenDoctorDirectory;
    use shared_database::MemoryBookingStore;

    fn app() -> Router {
        create_router(
            Arc::new(AppConfig::default()),
            Arc::new(MemoryBookingStore::new()),
            Arc::new(OpenDoctorDirectory),
            Arc::new(TracingNotifier),
        )
    }

    #[tokio::test]
    async fn test_root_and_cells_are_mounted() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(Request::builder().uri("/appointments/my").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/doctor/availability/rules")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
