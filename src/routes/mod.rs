pub mod health;
pub mod subscribers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::auth::JwtService;
use crate::db::{DocFilter, DocPatch, Storage};
use crate::middleware::{request_logger, require_admin, require_auth};
use crate::models::Subscriber;
use crate::AppState;

pub use health::health_check;
pub use subscribers::{
    create_subscriber, delete_subscriber, get_subscriber, list_subscribers, send_newsletter,
};

/// Any store holding subscriber documents
pub trait SubscriberStore: Storage<Data = Subscriber, Filter = DocFilter, Patch = DocPatch> {}

impl<S> SubscriberStore for S where S: Storage<Data = Subscriber, Filter = DocFilter, Patch = DocPatch> {}

/// Build the service router
///
/// Reader routes need any valid token; `/api/admin` routes need an admin
/// or super admin role. Every request is logged.
pub fn router<S: SubscriberStore>(state: AppState<S>) -> Router {
    let readers = Router::new()
        .route("/api/subscribers", get(list_subscribers::<S>))
        .route("/api/subscribers/:id", get(get_subscriber::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth::<JwtService>,
        ));

    let admins = Router::new()
        .route("/api/admin/subscribers", post(create_subscriber::<S>))
        .route("/api/admin/subscribers/:id", delete(delete_subscriber::<S>))
        .route("/api/admin/newsletter", post(send_newsletter::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_admin::<JwtService>,
        ));

    Router::new()
        .route("/health", get(health_check::<S>))
        .merge(readers)
        .merge(admins)
        .layer(middleware::from_fn(request_logger))
        .with_state(state)
}
