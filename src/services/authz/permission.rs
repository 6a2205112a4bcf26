//! Permission grants and the evaluator that decides allow/deny.
//!
//! Evaluation is a union: any grant of the required type (or `admin`) whose
//! scope glob matches the path allows the operation. Order does not matter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::services::authz::error::{AuthError, AuthErrorCode};
use crate::services::authz::pattern::{self, PatternError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Read,
    Write,
    Delete,
    Admin,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Admin => "admin",
        }
    }

    /// `admin` satisfies every requested operation type.
    pub fn satisfies(&self, requested: PermissionType) -> bool {
        *self == requested || *self == PermissionType::Admin
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "delete" => Ok(Self::Delete),
            "admin" => Ok(Self::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionScope {
    pub path: String,
}

/// A `(type, path glob)` grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "type")]
    pub kind: PermissionType,
    pub scope: PermissionScope,
}

impl Permission {
    pub fn new(kind: PermissionType, path: impl Into<String>) -> Self {
        Self {
            kind,
            scope: PermissionScope { path: path.into() },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(Vec<Permission>);

impl PermissionSet {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Permission] {
        &self.0
    }
}

impl From<Vec<Permission>> for PermissionSet {
    fn from(v: Vec<Permission>) -> Self {
        Self(v)
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Why an operation was denied. Diagnostics only; callers just see "forbidden".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    EmptyPermissionSet,
    NoGrantForOperation(PermissionType),
    NoMatchingScope,
    InvalidPath(PatternError),
    PathOutsideTenant,
    TenantInactive,
    UnknownTenant,
    UnknownTool(String),
    /// Authorization could not complete; carries the underlying error class.
    Failed(AuthErrorCode),
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyPermissionSet => "EMPTY_PERMISSION_SET",
            Self::NoGrantForOperation(_) => "NO_GRANT_FOR_OPERATION",
            Self::NoMatchingScope => "NO_MATCHING_SCOPE",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::PathOutsideTenant => "PATH_OUTSIDE_TENANT",
            Self::TenantInactive => "TENANT_INACTIVE",
            Self::UnknownTenant => "UNKNOWN_TENANT",
            Self::UnknownTool(_) => "UNKNOWN_TOOL",
            Self::Failed(_) => "AUTHORIZATION_FAILED",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPermissionSet => write!(f, "no permissions granted"),
            Self::NoGrantForOperation(op) => write!(f, "no grant for '{}'", op),
            Self::NoMatchingScope => write!(f, "no grant scope matches path"),
            Self::InvalidPath(e) => write!(f, "invalid path: {}", e),
            Self::PathOutsideTenant => write!(f, "path outside tenant namespace"),
            Self::TenantInactive => write!(f, "tenant inactive"),
            Self::UnknownTenant => write!(f, "unknown tenant"),
            Self::UnknownTool(name) => write!(f, "unknown tool '{}'", name),
            Self::Failed(code) => write!(f, "authorization failed: {}", code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `permissions` grant `operation` on `path`.
///
/// `path` must already be resolved and normalized by `TenantPathResolver`.
pub fn check(permissions: &PermissionSet, path: &str, operation: PermissionType) -> Decision {
    if let Err(err) = pattern::validate_path(path) {
        return Decision::Deny(DenyReason::InvalidPath(err));
    }
    if permissions.is_empty() {
        return Decision::Deny(DenyReason::EmptyPermissionSet);
    }

    let mut candidates = permissions
        .iter()
        .filter(|p| p.kind.satisfies(operation))
        .peekable();

    if candidates.peek().is_none() {
        return Decision::Deny(DenyReason::NoGrantForOperation(operation));
    }

    for grant in candidates {
        match pattern::try_match_path(&grant.scope.path, path) {
            Ok(true) => return Decision::Allow,
            Ok(false) => {}
            // The path is already valid, so the grant's pattern is at fault.
            Err(err) => {
                tracing::warn!(kind = %grant.kind, error = %err, "ignoring grant with invalid scope pattern");
            }
        }
    }

    Decision::Deny(DenyReason::NoMatchingScope)
}

/// Like [`check`], but raises `PermissionDenied` for enforcement points.
pub fn require_permission(
    permissions: &PermissionSet,
    path: &str,
    operation: PermissionType,
) -> Result<(), AuthError> {
    match check(permissions, path, operation) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(AuthError::PermissionDenied(reason)),
    }
}
