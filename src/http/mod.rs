//! Route protection for axum.
//!
//! [`protect`] wraps a router's routes with a [`RouteGuard`]. Each request
//! gets its own [`UnitOfWork`] whose user is the username of the Basic
//! `Authorization` header. The membership check runs on a blocking thread;
//! on denial the route is not called and `401 Unauthorized` is returned.
//! Allowed requests carry the unit of work as an extension:
//!
//! ```rust,ignore
//! async fn report(Extension(scope): Extension<UnitOfWork>) -> String {
//!     format!("hello {}", scope.user().unwrap_or_default())
//! }
//!
//! let guard = RouteGuard::new(Authorizer::<Group>::new(handle), Requirement::group("admins"));
//! let app = protect(Router::new().route("/report", get(report)), guard);
//! ```
//!
//! Passwords are not verified here. Authenticating the caller is the job of
//! whatever sits in front of the application.

use crate::context::UnitOfWork;
use crate::models::{Group, Membership};
use crate::services::{Authorizer, Requirement};
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A requirement enforced on every request to a route.
pub struct RouteGuard<G: Membership = Group> {
    authorizer: Arc<Authorizer<G>>,
    requirement: Arc<Requirement>,
}

impl<G: Membership> RouteGuard<G> {
    /// Creates a guard.
    #[must_use]
    pub fn new(authorizer: Authorizer<G>, requirement: Requirement) -> Self {
        Self {
            authorizer: Arc::new(authorizer),
            requirement: Arc::new(requirement),
        }
    }

    /// The enforced requirement.
    #[must_use]
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }
}

impl<G: Membership> Clone for RouteGuard<G> {
    fn clone(&self) -> Self {
        Self {
            authorizer: Arc::clone(&self.authorizer),
            requirement: Arc::clone(&self.requirement),
        }
    }
}

/// Protects every route of `router` with `guard`.
pub fn protect<S, G>(router: Router<S>, guard: RouteGuard<G>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    G: Membership + 'static,
{
    router.route_layer(from_fn_with_state(guard, guard_request::<G>))
}

/// Middleware that checks the request's user against the guard.
pub async fn guard_request<G: Membership + 'static>(
    State(guard): State<RouteGuard<G>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut scope = UnitOfWork::new();
    if let Some(user) = basic_auth_user(request.headers()) {
        scope = scope.with_user(user);
    }

    let check_scope = scope.clone();
    let check_guard = guard.clone();
    let decision = tokio::task::spawn_blocking(move || {
        check_guard
            .authorizer
            .authorize(&check_scope, &check_guard.requirement)
    })
    .await;

    let response = match decision {
        Ok(Ok(())) => {
            request.extensions_mut().insert(scope.clone());
            next.run(request).await
        },
        Ok(Err(e)) => {
            debug!(unit_of_work = scope.id(), error = %e, "Request rejected");
            unauthorized()
        },
        Err(e) => {
            error!(unit_of_work = scope.id(), error = %e, "Authorization task failed");
            unauthorized()
        },
    };

    let id = scope.id().to_string();
    let closed = tokio::task::spawn_blocking(move || scope.finish()).await;
    if !matches!(closed, Ok(Ok(()))) {
        warn!(unit_of_work = %id, "Failed to release request connections");
    }
    response
}

/// Username of a Basic `Authorization` header.
fn basic_auth_user(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let user = credentials.split(':').next()?;
    (!user.is_empty()).then(|| user.to_string())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"opendir\"")],
        "Unauthorized",
    )
        .into_response()
}
