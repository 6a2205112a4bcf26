//! Role → permission expansion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::services::authz::context::Principal;
use crate::services::authz::permission::{Permission, PermissionSet, PermissionType};

const EVERYTHING: &str = "/**";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Owner,
    Admin,
}

impl Role {
    /// Unknown names yield `None`, which expands to nothing.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "viewer" => Some(Self::Viewer),
            "editor" => Some(Self::Editor),
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Owner => "owner",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn expand(role: Role) -> PermissionSet {
    let kinds: &[PermissionType] = match role {
        Role::Viewer => &[PermissionType::Read],
        Role::Editor => &[PermissionType::Read, PermissionType::Write],
        Role::Owner => &[
            PermissionType::Read,
            PermissionType::Write,
            PermissionType::Delete,
        ],
        Role::Admin => &[PermissionType::Admin],
    };

    kinds
        .iter()
        .map(|kind| Permission::new(*kind, EVERYTHING))
        .collect()
}

pub fn expand_name(name: &str) -> PermissionSet {
    Role::parse(name).map(expand).unwrap_or_default()
}

/// Explicit grants win over the role; neither means no access.
pub fn effective_permissions(principal: &Principal) -> PermissionSet {
    if let Some(explicit) = &principal.explicit_permissions {
        return explicit.clone();
    }
    principal.role.map(expand).unwrap_or_default()
}
