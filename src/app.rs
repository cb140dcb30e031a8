use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{FirebaseIdentityProvider, IdentityProvider, SharedSecretIdentityProvider, TokenVerifier};
use crate::config::{AppConfig, ConfigError, IdentityProviderKind, SecurityConfig};
use crate::database::Db;
use crate::handlers::{courses, enrollments, reviews, system, users};
use crate::middleware::require_principal;

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub verifier: TokenVerifier,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: Db, verifier: TokenVerifier, config: AppConfig) -> Self {
        Self {
            db,
            verifier,
            config: Arc::new(config),
        }
    }

    /// Build state from configuration with the identity provider it names.
    pub fn from_config(db: Db, config: AppConfig) -> Result<Self, ConfigError> {
        let verifier = build_verifier(&config.security)?;
        Ok(Self::new(db, verifier, config))
    }
}

pub fn build_verifier(security: &SecurityConfig) -> Result<TokenVerifier, ConfigError> {
    let provider: Arc<dyn IdentityProvider> = match security.identity_provider {
        IdentityProviderKind::Firebase => {
            let project_id = security
                .firebase_project_id
                .clone()
                .ok_or(ConfigError::Missing("FIREBASE_PROJECT_ID"))?;
            Arc::new(FirebaseIdentityProvider::new(project_id, security.jwks_url.clone()))
        }
        IdentityProviderKind::SharedSecret => {
            let secret = security
                .shared_secret
                .as_deref()
                .ok_or(ConfigError::Missing("AUTH_SHARED_SECRET"))?;
            Arc::new(SharedSecretIdentityProvider::new(secret))
        }
    };

    Ok(TokenVerifier::new(provider, Duration::from_millis(security.verify_timeout_ms)))
}

/// The full HTTP surface.
///
/// Protected methods carry the verify stage as a per-method `route_layer`,
/// so an unauthenticated request is answered with 401 before its handler
/// runs and before any store access. Open methods never see the verifier,
/// and a method a path does not serve still gets 405.
pub fn router(state: AppState) -> Router {
    let verify = from_fn_with_state(state.verifier.clone(), require_principal);
    let guarded = |methods: MethodRouter<AppState>| methods.route_layer(verify.clone());

    let app = Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .route("/courses", get(courses::list).merge(guarded(post(courses::create))))
        .route("/featured-courses", get(courses::featured))
        .route("/popular-courses", get(courses::popular))
        .route("/myCourses", guarded(get(courses::mine)))
        .route(
            "/courses/:id",
            get(courses::get).merge(guarded(
                put(courses::update).patch(courses::update).delete(courses::delete),
            )),
        )
        .route("/reviews", post(reviews::create))
        .route("/reviews/:course_id", get(reviews::list_for_course))
        .route("/enrollments", guarded(post(enrollments::create)))
        .route("/myEnrollments", guarded(get(enrollments::mine)))
        .route("/enrollments/:id", guarded(delete(enrollments::delete)))
        .route("/users", post(users::create))
        .route("/users/:id", guarded(get(users::get).patch(users::update)))
        .layer(cors_layer(&state.config));

    let app = if state.config.api.enable_request_logging {
        app.layer(TraceLayer::new_for_http())
    } else {
        app
    };

    app.with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins = &config.security.cors_origins;
    if crate::is_development!(config) || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
