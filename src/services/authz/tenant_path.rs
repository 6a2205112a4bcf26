//! Tenant namespace confinement.
//!
//! Every caller path is interpreted inside the tenant root, whether it is
//! written relative (`data/x`) or absolute (`/data/x`). Resolution is purely
//! lexical and never touches the filesystem.

use crate::services::authz::error::AuthError;

pub const DEFAULT_ROOT_TEMPLATE: &str = "/tenants/{tenant_id}";
const TENANT_PLACEHOLDER: &str = "{tenant_id}";

#[derive(Debug, Clone)]
pub struct TenantPathResolver {
    root_template: String,
}

impl Default for TenantPathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_TEMPLATE)
    }
}

impl TenantPathResolver {
    /// `root_template` must contain `{tenant_id}`, e.g. `/srv/fs/{tenant_id}`.
    pub fn new(root_template: impl Into<String>) -> Self {
        Self {
            root_template: root_template.into(),
        }
    }

    pub fn root_template(&self) -> &str {
        &self.root_template
    }

    /// Absolute root directory of a tenant.
    pub fn root_for(&self, tenant_id: &str) -> Result<String, AuthError> {
        validate_tenant_id(tenant_id)?;
        let raw = self.root_template.replace(TENANT_PLACEHOLDER, tenant_id);
        let segments = normalize_segments(&raw)
            .ok_or_else(|| AuthError::path_escape("tenant root template escapes '/'"))?;
        if segments.is_empty() {
            return Err(AuthError::path_escape("tenant root resolves to '/'"));
        }
        Ok(join_absolute(&segments))
    }

    /// Confine `caller_path` to the tenant and return the absolute path.
    pub fn resolve(&self, tenant_id: &str, caller_path: &str) -> Result<String, AuthError> {
        if caller_path.is_empty() {
            return Err(AuthError::path_escape("empty path"));
        }
        if caller_path.contains('\0') {
            return Err(AuthError::path_escape("path contains NUL"));
        }

        let root = self.root_for(tenant_id)?;

        // Normalize before prefixing: `..` may never pop above the tenant root.
        let relative = normalize_segments(caller_path).ok_or_else(|| {
            tracing::warn!(tenant_id, path = caller_path, "path escape attempt");
            AuthError::path_escape(format!("'{}' leaves the tenant root", caller_path))
        })?;

        let joined = if relative.is_empty() {
            root.clone()
        } else {
            format!("{}/{}", root, relative.join("/"))
        };

        // Re-normalize the joined path and check it structurally.
        let absolute = normalize_segments(&joined)
            .map(|segments| join_absolute(&segments))
            .ok_or_else(|| AuthError::path_escape("resolved path leaves '/'"))?;

        if !is_under(&root, &absolute) {
            tracing::warn!(tenant_id, path = caller_path, resolved = %absolute, "path escape after resolution");
            return Err(AuthError::path_escape(format!(
                "'{}' leaves the tenant root",
                caller_path
            )));
        }

        Ok(absolute)
    }

    /// Independent structural guard for the point of filesystem access.
    ///
    /// Does not normalize: paths carrying `.`/`..`/empty segments are rejected
    /// outright.
    pub fn is_within_tenant(&self, tenant_id: &str, absolute_path: &str) -> bool {
        let Ok(root) = self.root_for(tenant_id) else {
            return false;
        };
        if !absolute_path.starts_with('/') || absolute_path.contains('\0') {
            return false;
        }
        let clean = absolute_path[1..]
            .split('/')
            .all(|s| !s.is_empty() && s != "." && s != "..");
        clean && is_under(&root, absolute_path)
    }

    /// Inverse of [`resolve`](Self::resolve): the tenant-visible path, `/` for the root.
    pub fn to_relative(&self, tenant_id: &str, absolute_path: &str) -> Result<String, AuthError> {
        if !self.is_within_tenant(tenant_id, absolute_path) {
            return Err(AuthError::path_escape(format!(
                "'{}' is outside the tenant root",
                absolute_path
            )));
        }
        let root = self.root_for(tenant_id)?;
        let rest = &absolute_path[root.len()..];
        Ok(if rest.is_empty() {
            "/".to_string()
        } else {
            rest.to_string()
        })
    }
}

fn validate_tenant_id(tenant_id: &str) -> Result<(), AuthError> {
    let bad = tenant_id.trim().is_empty()
        || tenant_id == "."
        || tenant_id == ".."
        || tenant_id.contains(['/', '\\', '\0']);
    if bad {
        return Err(AuthError::path_escape(format!(
            "invalid tenant id '{}'",
            tenant_id.escape_debug()
        )));
    }
    Ok(())
}

/// Lexical normalization. `None` when `..` would climb above the start.
fn normalize_segments(path: &str) -> Option<Vec<&str>> {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop()?;
            }
            s => out.push(s),
        }
    }
    Some(out)
}

fn join_absolute(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

fn is_under(root: &str, path: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::authz::error::AuthErrorCode;

    fn resolver() -> TenantPathResolver {
        TenantPathResolver::default()
    }

    #[test]
    fn test_relative_and_absolute_caller_paths() {
        let r = resolver();
        assert_eq!(r.resolve("t1", "data/x.json").unwrap(), "/tenants/t1/data/x.json");
        assert_eq!(r.resolve("t1", "/data/x.json").unwrap(), "/tenants/t1/data/x.json");
        assert_eq!(r.resolve("t1", "/").unwrap(), "/tenants/t1");
        assert_eq!(r.resolve("t1", ".").unwrap(), "/tenants/t1");
    }

    #[test]
    fn test_normalizes_redundant_separators_and_dots() {
        let r = resolver();
        assert_eq!(
            r.resolve("t1", "//data/./a/../b//c/").unwrap(),
            "/tenants/t1/data/b/c"
        );
    }

    #[test]
    fn test_escape_is_rejected() {
        let r = resolver();
        for p in ["..", "../t2/data", "/data/../../t2", "a/../../..", "/../etc/passwd"] {
            let err = r.resolve("t1", p).unwrap_err();
            assert_eq!(err.code(), AuthErrorCode::PathEscape, "path {p}");
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let r = resolver();
        assert!(r.resolve("t1", "").is_err());
        assert!(r.resolve("t1", "a\0b").is_err());
        assert!(r.resolve("", "a").is_err());
        assert!(r.resolve("../t2", "a").is_err());
        assert!(r.resolve("..", "a").is_err());
    }

    #[test]
    fn test_resolve_is_idempotent_through_to_relative() {
        let r = resolver();
        for p in ["data/x.json", "/a/b/../c", "/", "x/./y/"] {
            let once = r.resolve("t1", p).unwrap();
            let rel = r.to_relative("t1", &once).unwrap();
            assert_eq!(r.resolve("t1", &rel).unwrap(), once, "path {p}");
        }
    }

    #[test]
    fn test_is_within_tenant_is_structural() {
        let r = resolver();
        assert!(r.is_within_tenant("t1", "/tenants/t1"));
        assert!(r.is_within_tenant("t1", "/tenants/t1/data"));
        assert!(!r.is_within_tenant("t1", "/tenants/t10/data"));
        assert!(!r.is_within_tenant("t1", "/tenants/t1/../t2"));
        assert!(!r.is_within_tenant("t1", "/tenants/t1//x"));
        assert!(!r.is_within_tenant("t1", "tenants/t1/x"));
        assert!(!r.is_within_tenant("t1", "/tenants/t2/x"));
    }

    #[test]
    fn test_to_relative() {
        let r = resolver();
        assert_eq!(r.to_relative("t1", "/tenants/t1").unwrap(), "/");
        assert_eq!(r.to_relative("t1", "/tenants/t1/a/b").unwrap(), "/a/b");
        assert!(r.to_relative("t1", "/tenants/t2/a").is_err());
    }

    #[test]
    fn test_custom_root_template() {
        let r = TenantPathResolver::new("/srv/fs/{tenant_id}/root/");
        assert_eq!(r.root_for("acme").unwrap(), "/srv/fs/acme/root");
        assert_eq!(r.resolve("acme", "x").unwrap(), "/srv/fs/acme/root/x");
    }
}
