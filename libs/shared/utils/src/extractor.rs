use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::typed_header::{TypedHeader, TypedHeaderRejection};
use headers::{authorization::Bearer, Authorization};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Validates the bearer token and stores the caller as a [`User`] extension.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = auth
        .map_err(|_| AppError::Auth("Missing or invalid authorization header".to_string()))?;

    let user = validate_token(auth.token(), &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}

// ==============================================================================
// ROLE GUARDS
// ==============================================================================

pub fn require_role(user: &User, role: &str) -> Result<(), AppError> {
    if user.has_role(role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("This action requires the {} role", role)))
    }
}

pub fn require_doctor(user: &User) -> Result<(), AppError> {
    require_role(user, shared_models::auth::ROLE_DOCTOR)
}

pub fn require_patient(user: &User) -> Result<(), AppError> {
    require_role(user, shared_models::auth::ROLE_PATIENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::{
        http::{header, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    use crate::test_utils::{JwtTestUtils, TestConfig, TestUser};

    async fn whoami(Extension(user): Extension<User>) -> String {
        user.id
    }

    fn app(config: Arc<AppConfig>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(config, auth_middleware))
    }

    #[tokio::test]
    async fn test_middleware_accepts_valid_token() {
        let config = TestConfig::default();
        let user = TestUser::patient("p@example.com");
        let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

        let response = app(config.to_arc())
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_rejects_missing_header() {
        let config = TestConfig::default();

        let response = app(config.to_arc())
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_role_guards() {
        let doctor = TestUser::doctor("d@example.com").to_user();

        assert!(require_doctor(&doctor).is_ok());
        assert_matches!(require_patient(&doctor), Err(AppError::Forbidden(_)));
    }
}
