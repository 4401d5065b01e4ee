use std::collections::HashMap;

use gardenlink_api::models::Role;

use crate::error::Result;
use crate::services::AccountService;
use crate::session::SIGN_IN_PATH;

const DASHBOARD: &str = "/dashboard";
const AUTH: &str = "/auth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

/// Role based navigation guard for the dashboard.
///
/// Only paths under one of the matcher prefixes are checked. Signed out users
/// are sent to the sign-in page, signed in users are kept out of the auth
/// pages, and every role sees only the dashboard sections on its allow-list.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    matcher: Vec<String>,
    allow: HashMap<Role, Vec<String>>,
}

impl RouteGuard {
    pub fn new(matcher: Vec<String>) -> Self {
        Self {
            matcher,
            allow: default_allow_list(),
        }
    }

    /// Replaces the allowed path prefixes of `role`.
    pub fn with_role(mut self, role: Role, prefixes: &[&str]) -> Self {
        self.allow
            .insert(role, prefixes.iter().map(|prefix| prefix.to_string()).collect());
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.iter().any(|prefix| under(path, prefix))
    }

    pub fn is_allowed(&self, role: Role, path: &str) -> bool {
        self.allow
            .get(&role)
            .is_some_and(|prefixes| prefixes.iter().any(|prefix| under(path, prefix)))
    }

    /// Landing page of `role`.
    pub fn home(&self, role: Role) -> String {
        self.allow
            .get(&role)
            .and_then(|prefixes| prefixes.first())
            .cloned()
            .unwrap_or_else(|| SIGN_IN_PATH.to_string())
    }

    /// Decision for `path` given the role of a validated session, or `None`
    /// when there is no valid session.
    pub fn decide(&self, path: &str, role: Option<Role>) -> GuardDecision {
        if !self.matches(path) {
            return GuardDecision::Allow;
        }

        match role {
            None if under(path, AUTH) => GuardDecision::Allow,
            None => GuardDecision::Redirect(SIGN_IN_PATH.to_string()),
            Some(role) if under(path, AUTH) => GuardDecision::Redirect(self.home(role)),
            Some(role) if !under(path, DASHBOARD) || self.is_allowed(role, path) => {
                GuardDecision::Allow
            }
            Some(role) => {
                tracing::debug!(%path, %role, "path not on the allow-list");
                GuardDecision::Redirect(self.home(role))
            }
        }
    }

    /// Validates the stored token with the backend, then decides.
    pub async fn authorize(&self, path: &str, account: &AccountService) -> Result<GuardDecision> {
        if !self.matches(path) {
            return Ok(GuardDecision::Allow);
        }

        let role = match account.validate_token().await {
            Ok(validation) if validation.valid => Some(validation.role),
            Ok(_) => None,
            Err(e) if e.is_auth() => None,
            Err(e) => return Err(e),
        };

        Ok(self.decide(path, role))
    }
}

fn default_allow_list() -> HashMap<Role, Vec<String>> {
    let user = ["/dashboard/home", "/dashboard/account", "/dashboard/device"];
    let dosen = [
        "/dashboard/home",
        "/dashboard/account",
        "/dashboard/device",
        "/dashboard/logs",
    ];

    [
        (Role::Admin, &["/dashboard"][..]),
        (Role::User, &user[..]),
        (Role::Magang, &user[..]),
        (Role::Dosen, &dosen[..]),
        (Role::Mahasiswa, &["/dashboard/home", "/dashboard/account"][..]),
        (Role::Guest, &["/dashboard/home"][..]),
    ]
    .into_iter()
    .map(|(role, prefixes)| (role, prefixes.iter().map(|p| p.to_string()).collect()))
    .collect()
}

/// Prefix match on whole path segments, so `/dashboard` does not cover `/dashboards`.
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}
