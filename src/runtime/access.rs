//! Access control for actions
//!
//! Every action carries a [`CapabilityRule`]: either a static set of
//! permissions that must all be held, or a predicate trusted verbatim. The
//! [`AccessGate`] evaluates a rule for a caller and an [`Operation`]; viewing
//! an action collapses onto executing it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::action::Action;
use super::cache::CacheabilityMetadata;
use super::error::RpcError;

/// Cache context added by permission checks.
pub const PERMISSIONS_CONTEXT: &str = "user.permissions";

/// Identity of the party submitting requests.
pub trait Caller: Send + Sync {
    /// Display name, used in logs.
    fn name(&self) -> &str;

    /// Whether the caller holds `permission`.
    fn has_permission(&self, permission: &str) -> bool;
}

/// Caller described by a name and a flat permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Display name
    pub name: String,
    /// Granted permissions
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl CallerIdentity {
    /// Caller with no permissions.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    /// Named caller with no permissions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: BTreeSet::new(),
        }
    }

    /// Grant a permission.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

impl Default for CallerIdentity {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl Caller for CallerIdentity {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Operation being authorized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Invoke the action.
    Execute,
    /// Read the action's metadata.
    View,
    /// Anything else; never allowed by static rules.
    Other(String),
}

impl Operation {
    /// Stable label.
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Execute => "execute",
            Operation::View => "view",
            Operation::Other(name) => name,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "execute" => Operation::Execute,
            "view" => Operation::View,
            other => Operation::Other(other.to_string()),
        })
    }
}

/// Tri-state outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Explicitly allowed.
    Allowed,
    /// No opinion; treated as not allowed.
    Neutral,
    /// Explicitly forbidden.
    Forbidden,
}

/// Result of evaluating a capability rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessDecision {
    /// Outcome
    pub verdict: Verdict,
    /// Optional human-readable reason
    pub reason: Option<String>,
    /// How the decision may be cached
    pub cacheability: CacheabilityMetadata,
}

impl AccessDecision {
    /// Allowed, with no cache dependencies.
    pub fn allowed() -> Self {
        Self {
            verdict: Verdict::Allowed,
            reason: None,
            cacheability: CacheabilityMetadata::default(),
        }
    }

    /// Neither allowed nor forbidden.
    pub fn neutral(reason: Option<String>) -> Self {
        Self {
            verdict: Verdict::Neutral,
            reason,
            cacheability: CacheabilityMetadata::default(),
        }
    }

    /// Forbidden.
    pub fn forbidden(reason: Option<String>) -> Self {
        Self {
            verdict: Verdict::Forbidden,
            reason,
            cacheability: CacheabilityMetadata::default(),
        }
    }

    /// Allowed iff the caller holds `permission`; varies by permissions.
    pub fn allowed_if_has_permission(caller: &dyn Caller, permission: &str) -> Self {
        let decision = if caller.has_permission(permission) {
            Self::allowed()
        } else {
            Self::neutral(Some(format!("The '{permission}' permission is required.")))
        };
        decision.add_cache_context(PERMISSIONS_CONTEXT)
    }

    /// Builder-style cache context.
    pub fn add_cache_context(mut self, context: impl Into<String>) -> Self {
        self.cacheability.contexts.insert(context.into());
        self
    }

    /// Whether the operation may proceed.
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allowed
    }

    /// Conjunction: forbidden dominates, then neutral; allowed needs both.
    pub fn and_if(self, other: AccessDecision) -> AccessDecision {
        let cacheability = self.cacheability.clone().merged(&other.cacheability);
        let (verdict, reason) = match (self.verdict, other.verdict) {
            (Verdict::Forbidden, _) => (Verdict::Forbidden, self.reason),
            (_, Verdict::Forbidden) => (Verdict::Forbidden, other.reason),
            (Verdict::Neutral, _) => (Verdict::Neutral, self.reason),
            (_, Verdict::Neutral) => (Verdict::Neutral, other.reason),
            (Verdict::Allowed, Verdict::Allowed) => (Verdict::Allowed, None),
        };
        AccessDecision {
            verdict,
            reason,
            cacheability,
        }
    }

    /// Error reported when dispatch is denied.
    pub fn denial_error(&self) -> RpcError {
        let message = match self.reason.as_deref() {
            Some(reason) if !reason.is_empty() => format!("Access Denied: {reason}"),
            _ => "Access Denied".to_string(),
        };
        RpcError::invalid_request(message)
    }
}

/// Predicate capability: `(operation, caller) -> decision`.
pub type CapabilityPredicate =
    Arc<dyn Fn(&Operation, &dyn Caller) -> AccessDecision + Send + Sync>;

/// Authorization policy attached to an action.
#[derive(Clone)]
pub enum CapabilityRule {
    /// Every permission must be held; an empty set always allows.
    Permissions(BTreeSet<String>),
    /// Custom decision function.
    Predicate(CapabilityPredicate),
}

impl CapabilityRule {
    /// Rule requiring no permissions.
    pub fn public() -> Self {
        CapabilityRule::Permissions(BTreeSet::new())
    }

    /// Rule requiring all of `permissions`.
    pub fn permissions<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CapabilityRule::Permissions(permissions.into_iter().map(Into::into).collect())
    }

    /// Rule delegating to a predicate.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Operation, &dyn Caller) -> AccessDecision + Send + Sync + 'static,
    {
        CapabilityRule::Predicate(Arc::new(predicate))
    }

    /// Evaluate for a concrete operation.
    fn evaluate(&self, operation: &Operation, caller: &dyn Caller) -> AccessDecision {
        match self {
            CapabilityRule::Predicate(predicate) => predicate(operation, caller),
            CapabilityRule::Permissions(permissions) => permissions
                .iter()
                .fold(AccessDecision::allowed(), |decision, permission| {
                    decision.and_if(AccessDecision::allowed_if_has_permission(
                        caller, permission,
                    ))
                }),
        }
    }
}

impl fmt::Debug for CapabilityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityRule::Permissions(permissions) => {
                f.debug_tuple("Permissions").field(permissions).finish()
            }
            CapabilityRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl Default for CapabilityRule {
    fn default() -> Self {
        Self::public()
    }
}

/// Evaluates capability rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGate;

impl AccessGate {
    /// Check whether `caller` may perform `operation` on `action`.
    pub fn check(action: &Action, caller: &dyn Caller, operation: &Operation) -> AccessDecision {
        match operation {
            Operation::Execute => action.capability().evaluate(operation, caller),
            Operation::View => Self::check(action, caller, &Operation::Execute),
            Operation::Other(_) => match action.capability() {
                CapabilityRule::Predicate(predicate) => predicate(operation, caller),
                CapabilityRule::Permissions(_) => AccessDecision::neutral(None),
            },
        }
    }
}
