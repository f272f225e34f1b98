//! Route guard middleware.
//!
//! Every request is classified by path. Protected paths need a live session;
//! without one the request is redirected to the login page before any handler
//! runs. Auth pages are always reachable, everything else is public.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::auth::{HasSessionBackend, LOGIN_PATH, SessionState, resolve, stash_refreshed};

const PROTECTED_PREFIX: &str = "/protected";
const AUTH_PREFIX: &str = "/auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Protected,
    Auth,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(&'static str),
}

/// `path` is `prefix` itself or lies below it (`/protected/x`, not `/protectedx`).
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn classify(path: &str) -> RouteClass {
    if under(path, PROTECTED_PREFIX) {
        RouteClass::Protected
    } else if under(path, AUTH_PREFIX) {
        RouteClass::Auth
    } else {
        RouteClass::Public
    }
}

pub fn decide(class: RouteClass, authenticated: bool) -> GuardDecision {
    match class {
        RouteClass::Auth => GuardDecision::Allow,
        RouteClass::Protected if !authenticated => GuardDecision::Redirect(LOGIN_PATH),
        _ => GuardDecision::Allow,
    }
}

/// Middleware enforcing the route classification.
///
/// Only protected paths resolve the session here. The resolved state is put
/// into the request extensions so extractors further down reuse it.
pub async fn route_guard<S>(State(state): State<S>, mut request: Request, next: Next) -> Response
where
    S: HasSessionBackend + Clone + Send + Sync + 'static,
{
    let class = classify(request.uri().path());
    if class != RouteClass::Protected {
        return next.run(request).await;
    }

    // Request bodies are not Sync; resolve from an owned copy of the headers
    let headers = request.headers().clone();
    let resolution = resolve(state.provider(), &headers).await;
    let decision = decide(class, resolution.state.is_authenticated());

    match decision {
        GuardDecision::Redirect(to) => {
            debug!(path = %request.uri().path(), "No session for protected path, redirecting");
            Redirect::temporary(to).into_response()
        }
        GuardDecision::Allow => {
            if let Some(tokens) = resolution.refreshed {
                stash_refreshed(tokens);
            }
            request
                .extensions_mut()
                .insert::<SessionState>(resolution.state);
            next.run(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("/protected"), RouteClass::Protected);
        assert_eq!(classify("/protected/"), RouteClass::Protected);
        assert_eq!(classify("/protected/settings"), RouteClass::Protected);
        assert_eq!(classify("/auth"), RouteClass::Auth);
        assert_eq!(classify("/auth/login"), RouteClass::Auth);
        assert_eq!(classify("/"), RouteClass::Public);
        assert_eq!(classify("/api/auth/login"), RouteClass::Public);
    }

    #[test]
    fn test_classify_is_segment_aware() {
        assert_eq!(classify("/protectedfoo"), RouteClass::Public);
        assert_eq!(classify("/authors"), RouteClass::Public);
    }

    #[test]
    fn test_decide() {
        assert_eq!(
            decide(RouteClass::Protected, false),
            GuardDecision::Redirect("/auth/login")
        );
        assert_eq!(decide(RouteClass::Protected, true), GuardDecision::Allow);
        assert_eq!(decide(RouteClass::Auth, false), GuardDecision::Allow);
        assert_eq!(decide(RouteClass::Auth, true), GuardDecision::Allow);
        assert_eq!(decide(RouteClass::Public, false), GuardDecision::Allow);
    }
}
