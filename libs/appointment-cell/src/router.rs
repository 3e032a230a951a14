use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use doctor_cell::DoctorDirectory;
use shared_config::AppConfig;
use shared_database::BookingStore;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::Notifier;

pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn BookingStore>,
    pub directory: Arc<dyn DoctorDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    let patient_routes = Router::new()
        .route("/appointments/request", post(handlers::request_appointment))
        .route("/appointments/my", get(handlers::list_my_appointments))
        .route("/appointments/{appointment_id}", get(handlers::get_appointment))
        .route("/appointments/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route(
            "/appointments/{appointment_id}/reschedule",
            post(handlers::reschedule_appointment),
        )
        .route(
            "/appointments/{appointment_id}/waiting-list",
            get(handlers::get_waiting_list).post(handlers::join_waiting_list),
        );

    let doctor_routes = Router::new()
        .route("/doctor/appointments", get(handlers::list_doctor_appointments))
        .route(
            "/doctor/appointments/{appointment_id}/confirm",
            post(handlers::confirm_appointment),
        )
        .route(
            "/doctor/appointments/{appointment_id}/cancel",
            post(handlers::doctor_cancel_appointment),
        )
        .route(
            "/doctor/appointments/{appointment_id}/reschedule",
            post(handlers::doctor_reschedule_appointment),
        );

    Router::new()
        .merge(patient_routes)
        .merge(doctor_routes)
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
