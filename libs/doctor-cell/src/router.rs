use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_database::BookingStore;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::DoctorDirectory;

pub struct AvailabilityState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn BookingStore>,
    pub directory: Arc<dyn DoctorDirectory>,
}

pub fn availability_routes(state: Arc<AvailabilityState>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/doctor/availability/rules",
            get(handlers::list_rules).post(handlers::set_rules),
        )
        .route(
            "/doctor/availability/exceptions",
            get(handlers::list_exceptions).post(handlers::set_exceptions),
        )
        .route("/doctor/availability/bulk", post(handlers::set_bulk_availability))
        .route("/doctor/availability/calendar", get(handlers::get_my_calendar))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    let public_routes = Router::new()
        .route("/doctors/{doctor_id}/availability", get(handlers::get_doctor_availability));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
}
