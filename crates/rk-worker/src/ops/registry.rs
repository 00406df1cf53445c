//! Operation path resolution

use std::collections::HashMap;

use super::{OperationError, OperationId};

/// A parsed dotted operation path
///
/// The last segment is the method; everything before it names the group
/// (sub-service). A single-segment path addresses a top-level method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationPath<'a> {
    pub group: Option<&'a str>,
    pub method: &'a str,
}

impl<'a> OperationPath<'a> {
    pub fn parse(path: &'a str) -> Result<Self, OperationError> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(OperationError::MalformedPath(path.to_string()));
        }
        Ok(Self::split(path))
    }

    fn split(path: &'a str) -> Self {
        match path.rsplit_once('.') {
            Some((group, method)) => Self {
                group: Some(group),
                method,
            },
            None => Self {
                group: None,
                method: path,
            },
        }
    }
}

/// Group key for top-level methods
const TOP_LEVEL: &str = "";

/// Lookup table from group and method to [`OperationId`], built once when the
/// worker context starts
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    groups: HashMap<&'static str, HashMap<&'static str, OperationId>>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        let mut groups: HashMap<&'static str, HashMap<&'static str, OperationId>> =
            HashMap::new();
        for id in OperationId::ALL {
            let OperationPath { group, method } = OperationPath::split(id.path());
            let previous = groups
                .entry(group.unwrap_or(TOP_LEVEL))
                .or_default()
                .insert(method, id);
            debug_assert!(previous.is_none(), "duplicate operation path {}", id.path());
        }
        Self { groups }
    }

    /// Resolve a dotted path to its operation
    pub fn resolve(&self, path: &str) -> Result<OperationId, OperationError> {
        let parsed = OperationPath::parse(path)?;
        let methods = self
            .groups
            .get(parsed.group.unwrap_or(TOP_LEVEL))
            .ok_or_else(|| OperationError::UnknownGroup {
                path: path.to_string(),
                group: parsed.group.unwrap_or(TOP_LEVEL).to_string(),
            })?;
        methods
            .get(parsed.method)
            .copied()
            .ok_or_else(|| OperationError::UnknownMethod {
                path: path.to_string(),
                method: parsed.method.to_string(),
            })
    }

    /// All registered operations, sorted by path
    pub fn operations(&self) -> Vec<OperationId> {
        let mut ids: Vec<OperationId> = self
            .groups
            .values()
            .flat_map(|methods| methods.values().copied())
            .collect();
        ids.sort_by_key(|id| id.path());
        ids
    }
}
