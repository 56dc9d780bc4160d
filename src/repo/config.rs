use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings of a [`Repository`][`crate::Repository`].
///
/// # Examples
///
/// ```
/// use fastergt::RepositoryConfig;
///
/// let config: RepositoryConfig = serde_json::from_str(r#"{ "check_for_changes": false }"#).unwrap();
///
/// assert!(!config.check_for_changes);
/// assert!(!config.precompiled);
/// assert_eq!(config.plumbing_namespaces, vec!["fastergt.expr."]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Recompile a template when the size or modification time of its
    /// source changes.
    pub check_for_changes: bool,
    /// Load compiled units from `cache_dir` only, never compiling source.
    ///
    /// Without a `cache_dir` every file-backed template is not found.
    /// Embedded templates are still compiled.
    pub precompiled: bool,
    /// Directory of the on-disk unit cache.
    pub cache_dir: Option<PathBuf>,
    /// Directory the generated artifacts of every compile are written to.
    pub dump_sources_dir: Option<PathBuf>,
    /// Class prefixes of the host application. Empty means every class that
    /// is neither generated nor plumbing.
    pub application_namespaces: Vec<String>,
    /// Class prefixes whose frames are dropped from error traces.
    pub plumbing_namespaces: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            check_for_changes: true,
            precompiled: false,
            cache_dir: None,
            dump_sources_dir: None,
            application_namespaces: vec![],
            plumbing_namespaces: vec!["fastergt.expr.".to_string()],
        }
    }
}
