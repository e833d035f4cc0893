//! Axum middleware applying the route guard ahead of page handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use tracing::debug;

use super::{decide_for_cookie, RouteDecision};

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Name of the cookie holding the session JSON
    pub cookie_name: Arc<str>,
}

impl GuardConfig {
    pub fn new(cookie_name: impl Into<Arc<str>>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new("session")
    }
}

/// Redirects callers whose role may not reach the requested path. On
/// proceed, the parsed [`Session`](super::Session) (if any) is inserted into
/// the request extensions.
pub async fn route_guard(
    State(config): State<GuardConfig>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let cookie = jar.get(&config.cookie_name).map(|c| c.value().to_string());

    let (decision, session) = decide_for_cookie(cookie.as_deref(), &path);
    match decision {
        RouteDecision::Proceed => {
            if let Some(session) = session {
                request.extensions_mut().insert(session);
            }
            next.run(request).await
        }
        RouteDecision::Redirect(to) => {
            debug!(%path, %to, "Route guard redirect");
            Redirect::temporary(&to).into_response()
        }
    }
}
