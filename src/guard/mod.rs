//! Route Guard Module
//!
//! Decides, before any page handler runs, whether the caller's role may reach
//! a path. The decision is always either proceed or redirect.

mod middleware;
mod session;

pub use middleware::{route_guard, GuardConfig};
pub use session::{Role, Session};

pub const LOGIN_PATH: &str = "/login";
pub const ADMIN_HOME: &str = "/admin/dashboard";
pub const STAFF_HOME: &str = "/staff/dashboard";

const ADMIN_TREE: &str = "/admin";
const STAFF_TREE: &str = "/staff";

/// Who is asking, as far as routing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unauthenticated,
    Admin,
    Staff,
}

impl GuardState {
    pub fn from_session(session: Option<&Session>) -> Self {
        match session.map(|s| s.role) {
            None => GuardState::Unauthenticated,
            Some(Role::Admin) => GuardState::Admin,
            Some(Role::Staff) => GuardState::Staff,
        }
    }

    /// Landing page for the state, if authenticated.
    pub fn home(&self) -> Option<&'static str> {
        match self {
            GuardState::Unauthenticated => None,
            GuardState::Admin => Some(ADMIN_HOME),
            GuardState::Staff => Some(STAFF_HOME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Proceed,
    Redirect(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Area {
    Login,
    Admin,
    Staff,
    Public,
}

fn under(path: &str, tree: &str) -> bool {
    path == tree
        || path
            .strip_prefix(tree)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn classify(path: &str) -> Area {
    if under(path, LOGIN_PATH) {
        Area::Login
    } else if under(path, ADMIN_TREE) {
        Area::Admin
    } else if under(path, STAFF_TREE) {
        Area::Staff
    } else {
        Area::Public
    }
}

/// Routing decision for `state` requesting `path`.
pub fn decide(state: GuardState, path: &str) -> RouteDecision {
    let redirect = |to: &str| RouteDecision::Redirect(to.to_string());

    match (state, classify(path)) {
        (GuardState::Unauthenticated, Area::Admin | Area::Staff) => redirect(LOGIN_PATH),
        (GuardState::Admin, Area::Staff) => redirect(ADMIN_HOME),
        (GuardState::Staff, Area::Admin) => redirect(STAFF_HOME),
        (GuardState::Admin, Area::Login) => redirect(ADMIN_HOME),
        (GuardState::Staff, Area::Login) => redirect(STAFF_HOME),
        _ => RouteDecision::Proceed,
    }
}

/// Parses the cookie value (if any) and decides. Unparseable cookies count
/// as no session.
pub fn decide_for_cookie(cookie: Option<&str>, path: &str) -> (RouteDecision, Option<Session>) {
    let session = cookie.and_then(Session::from_cookie_value);
    let state = GuardState::from_session(session.as_ref());
    (decide(state, path), session)
}
