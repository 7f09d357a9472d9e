//! Authorization - API-Key Identities and Tool Allowlists
//!
//! Two-step API: resolve the session credential to an identity once at
//! startup, then answer "may this identity invoke (tool, action)?" per call.
//!
//! A presented-but-unknown credential (or a missing credential when
//! authentication is required) resolves to the *denied sentinel*: a
//! distinguished identity that every later authorization check denies. An
//! anonymous session (no identity at all) is allowed everything.
//!
//! The identity table is read-only after startup.

use std::collections::{HashMap, HashSet};

/// A resolved session identity.
#[derive(Debug, Clone)]
pub struct Identity {
    /// The API key this identity was resolved from.
    pub key: String,

    /// Display name used in audit records and denial reasons.
    pub name: String,

    /// Tools this identity may call, lowercased. `"*"` means all.
    allowed_tools: HashSet<String>,

    /// Per-tool action restrictions, lowercased. A tool with no entry
    /// allows every action.
    allowed_actions: HashMap<String, HashSet<String>>,

    /// Denied-sentinel marker.
    denied: bool,
}

impl Identity {
    /// Create an identity with its allowlists (compared case-insensitively).
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        allowed_tools: impl IntoIterator<Item = String>,
        allowed_actions: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            allowed_tools: allowed_tools
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect(),
            allowed_actions: allowed_actions
                .into_iter()
                .map(|(tool, actions)| {
                    (
                        tool.to_lowercase(),
                        actions.into_iter().map(|a| a.to_lowercase()).collect(),
                    )
                })
                .collect(),
            denied: false,
        }
    }

    /// The denied sentinel: marks "credential required but absent or bad".
    pub fn denied() -> Self {
        Self {
            key: String::new(),
            name: String::new(),
            allowed_tools: HashSet::new(),
            allowed_actions: HashMap::new(),
            denied: true,
        }
    }

    /// Whether this is the denied sentinel.
    pub fn is_denied(&self) -> bool {
        self.denied
    }

    fn may_call_tool(&self, tool: &str) -> bool {
        self.allowed_tools.contains("*") || self.allowed_tools.contains(&tool.to_lowercase())
    }

    fn may_call_action(&self, tool: &str, action: Option<&str>) -> bool {
        match self.allowed_actions.get(&tool.to_lowercase()) {
            Some(actions) => match action {
                Some(a) => actions.contains(&a.to_lowercase()),
                None => false,
            },
            None => true,
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone)]
pub struct AuthDecision {
    /// Whether the call may proceed.
    pub allowed: bool,

    /// Denial reason, surfaced to the client and the audit log.
    pub reason: Option<String>,
}

impl AuthDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Credential resolution and per-call authorization.
pub trait Authorizer: Send + Sync {
    /// Resolve the session credential. `None` is an anonymous session.
    fn resolve_identity(&self, credential: Option<&str>) -> Option<Identity>;

    /// Decide whether `identity` may invoke `(tool, action)`.
    fn authorize_tool_call(
        &self,
        identity: Option<&Identity>,
        tool: &str,
        action: Option<&str>,
    ) -> AuthDecision;
}

/// Null authorizer: anonymous sessions, everything allowed. Used when
/// authentication is disabled.
#[derive(Debug, Default)]
pub struct AllowAllAuthorizer;

impl Authorizer for AllowAllAuthorizer {
    fn resolve_identity(&self, _credential: Option<&str>) -> Option<Identity> {
        None
    }

    fn authorize_tool_call(
        &self,
        _identity: Option<&Identity>,
        _tool: &str,
        _action: Option<&str>,
    ) -> AuthDecision {
        AuthDecision::allow()
    }
}

/// API-key authorizer backed by a fixed identity table.
#[derive(Debug)]
pub struct ApiKeyAuthorizer {
    require_authentication: bool,
    identities: HashMap<String, Identity>,
}

impl ApiKeyAuthorizer {
    /// Build from configured identities, keyed by API key.
    pub fn new(require_authentication: bool, identities: Vec<Identity>) -> Self {
        Self {
            require_authentication,
            identities: identities
                .into_iter()
                .map(|i| (i.key.clone(), i))
                .collect(),
        }
    }
}

impl Authorizer for ApiKeyAuthorizer {
    fn resolve_identity(&self, credential: Option<&str>) -> Option<Identity> {
        match credential {
            Some(key) => match self.identities.get(key) {
                Some(identity) => Some(identity.clone()),
                // Presented but unknown: force later denials.
                None => Some(Identity::denied()),
            },
            None if self.require_authentication => Some(Identity::denied()),
            None => None,
        }
    }

    fn authorize_tool_call(
        &self,
        identity: Option<&Identity>,
        tool: &str,
        action: Option<&str>,
    ) -> AuthDecision {
        let identity = match identity {
            Some(identity) if identity.is_denied() => {
                return AuthDecision::deny("Authentication required");
            }
            Some(identity) => identity,
            // Anonymous sessions are allowed everything.
            None => return AuthDecision::allow(),
        };

        if !identity.may_call_tool(tool) {
            return AuthDecision::deny(format!(
                "Identity '{}' is not allowed to call tool '{}'",
                identity.name, tool
            ));
        }

        if !identity.may_call_action(tool, action) {
            return AuthDecision::deny(format!(
                "Identity '{}' is not allowed action '{}' on tool '{}'",
                identity.name,
                action.unwrap_or(""),
                tool
            ));
        }

        AuthDecision::allow()
    }
}
