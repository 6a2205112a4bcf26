use std::collections::HashMap;

use thiserror::Error;

use crate::services::authz::permission::PermissionType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolCatalogError {
    #[error("missing '=' in tool entry '{0}'")]
    MissingSeparator(String),
    #[error("empty tool name in '{0}'")]
    EmptyToolName(String),
    #[error("unknown operation '{operation}' for tool '{tool}'")]
    UnknownOperation { tool: String, operation: String },
}

/// Maps a tool name to the filesystem operation it performs.
pub trait ToolCatalog: Send + Sync {
    fn operation_for(&self, tool: &str) -> Option<PermissionType>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticToolCatalog {
    tools: HashMap<String, PermissionType>,
}

impl StaticToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock filesystem tool set.
    pub fn filesystem() -> Self {
        use PermissionType::*;

        [
            ("read_file", Read),
            ("list_directory", Read),
            ("stat", Read),
            ("search_files", Read),
            ("write_file", Write),
            ("create_directory", Write),
            ("move_file", Write),
            ("delete_file", Delete),
            ("set_permissions", Admin),
        ]
        .into_iter()
        .fold(Self::new(), |catalog, (tool, op)| catalog.with(tool, op))
    }

    pub fn with(mut self, tool: impl Into<String>, operation: PermissionType) -> Self {
        self.tools.insert(tool.into(), operation);
        self
    }

    /// Entries of `other` win over existing ones.
    pub fn merge(mut self, other: StaticToolCatalog) -> Self {
        self.tools.extend(other.tools);
        self
    }

    /// Parse `tool=operation` pairs separated by `,`.
    pub fn parse(raw: &str) -> Result<Self, ToolCatalogError> {
        let mut catalog = Self::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (tool, op) = entry
                .split_once('=')
                .ok_or_else(|| ToolCatalogError::MissingSeparator(entry.to_string()))?;
            let (tool, op) = (tool.trim(), op.trim());
            if tool.is_empty() {
                return Err(ToolCatalogError::EmptyToolName(entry.to_string()));
            }
            let op: PermissionType = op.parse().map_err(|_| ToolCatalogError::UnknownOperation {
                tool: tool.to_string(),
                operation: op.to_string(),
            })?;
            catalog = catalog.with(tool, op);
        }
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolCatalog for StaticToolCatalog {
    fn operation_for(&self, tool: &str) -> Option<PermissionType> {
        self.tools.get(tool).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_catalog() {
        let c = StaticToolCatalog::filesystem();
        assert_eq!(c.operation_for("read_file"), Some(PermissionType::Read));
        assert_eq!(c.operation_for("delete_file"), Some(PermissionType::Delete));
        assert_eq!(c.operation_for("READ_FILE"), None);
        assert_eq!(c.operation_for("rm_rf"), None);
    }

    #[test]
    fn test_parse() {
        let c = StaticToolCatalog::parse("grep=read, upload = write").unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.operation_for("upload"), Some(PermissionType::Write));

        assert_eq!(
            StaticToolCatalog::parse("grep"),
            Err(ToolCatalogError::MissingSeparator("grep".into()))
        );
        assert_eq!(
            StaticToolCatalog::parse("grep=execute"),
            Err(ToolCatalogError::UnknownOperation {
                tool: "grep".into(),
                operation: "execute".into(),
            })
        );
        assert_eq!(
            StaticToolCatalog::parse("=read"),
            Err(ToolCatalogError::EmptyToolName("=read".into()))
        );
        assert!(StaticToolCatalog::parse("").unwrap().is_empty());

        let merged = StaticToolCatalog::filesystem().merge(c);
        assert_eq!(merged.operation_for("upload"), Some(PermissionType::Write));
        assert_eq!(merged.operation_for("read_file"), Some(PermissionType::Read));
    }
}
