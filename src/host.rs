//! Collaborators supplied by the host application.
//!
//! The engine knows nothing about files, routing, messages, validation or
//! caching beyond these traits. Each one has a default that is good enough for
//! tests and for templates which do not use the feature.
use crate::{
    escape::{RawData, RawMarker},
    location::TemplateLocation,
    log::{Error, ACTIONS_UNSUPPORTED},
};
use dashmap::DashMap;
use std::{collections::HashMap, path::PathBuf, sync::Arc};

/// Turns a query path into a [`TemplateLocation`].
pub trait FileResolver: Send + Sync {
    /// Return the location of the template at the given path, if it exists.
    fn resolve(&self, query_path: &str) -> Option<TemplateLocation>;
}

/// Resolves query paths against a list of folders, first match wins.
///
/// The query path, without leading slashes, becomes the relative path of the
/// returned location.
#[derive(Debug, Default, Clone)]
pub struct FolderResolver {
    folders: Vec<PathBuf>,
}

impl FolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a folder to search, after the ones already added.
    pub fn with_folder<P>(mut self, folder: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.folders.push(folder.into());
        self
    }
}

impl FileResolver for FolderResolver {
    fn resolve(&self, query_path: &str) -> Option<TemplateLocation> {
        let relative_path = query_path.trim_start_matches('/');
        if relative_path.is_empty() {
            return None;
        }

        self.folders
            .iter()
            .map(|folder| folder.join(relative_path))
            .find(|path| path.is_file())
            .map(|path| TemplateLocation::file(relative_path, path))
    }
}

/// Resolves query paths against templates held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryResolver {
    templates: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template with the given relative path and source.
    pub fn with_template<P, S>(mut self, relative_path: P, source: S) -> Self
    where
        P: Into<String>,
        S: Into<String>,
    {
        self.templates.insert(relative_path.into(), source.into());
        self
    }
}

impl FileResolver for MemoryResolver {
    fn resolve(&self, query_path: &str) -> Option<TemplateLocation> {
        let relative_path = query_path.trim_start_matches('/');

        self.templates
            .get(relative_path)
            .map(|source| TemplateLocation::embedded_at(relative_path, source.as_str()))
    }
}

/// Produces the URL printed by `@{action}` and `@@{action}`.
pub trait ActionRenderer: Send + Sync {
    /// Return the URL of the action, absolute if requested.
    fn render(&self, action: &str, absolute: bool) -> Result<String, Error>;
}

/// The default [`ActionRenderer`], which rejects every action.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActions;

impl ActionRenderer for NoActions {
    fn render(&self, _: &str, _: bool) -> Result<String, Error> {
        Err(Error::template_runtime(ACTIONS_UNSUPPORTED))
    }
}

/// Resolves the text printed by `&{key, args}`.
pub trait MessageResolver: Send + Sync {
    /// Return the message for the key, formatted with the arguments.
    fn resolve(&self, key: &str, args: &[String]) -> String;
}

/// The default [`MessageResolver`], which prints the key itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyMessages;

impl MessageResolver for KeyMessages {
    fn resolve(&self, key: &str, _: &[String]) -> String {
        key.to_string()
    }
}

/// Answers the validation questions of `#{ifErrors}`, `#{ifError}` and `#{errorClass}`.
pub trait Validation: Send + Sync {
    fn has_errors(&self) -> bool;

    fn has_error(&self, key: &str) -> bool;
}

/// The default [`Validation`], which never reports an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoValidation;

impl Validation for NoValidation {
    fn has_errors(&self) -> bool {
        false
    }

    fn has_error(&self, _: &str) -> bool {
        false
    }
}

/// Backs the `#{cache}` tag.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value, for the duration given by the `for` argument of the tag.
    fn set(&self, key: &str, value: &str, duration: Option<&str>);
}

/// The default [`Cache`], which keeps every value in memory and ignores durations.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: &str, _: Option<&str>) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

/// Every host collaborator used while rendering.
#[derive(Clone)]
pub struct Host {
    pub(crate) resolver: Arc<dyn FileResolver>,
    pub(crate) actions: Arc<dyn ActionRenderer>,
    pub(crate) messages: Arc<dyn MessageResolver>,
    pub(crate) validation: Arc<dyn Validation>,
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) raw: Arc<dyn RawData>,
}

impl Host {
    pub fn resolver(&self) -> &dyn FileResolver {
        self.resolver.as_ref()
    }

    pub fn actions(&self) -> &dyn ActionRenderer {
        self.actions.as_ref()
    }

    pub fn messages(&self) -> &dyn MessageResolver {
        self.messages.as_ref()
    }

    pub fn validation(&self) -> &dyn Validation {
        self.validation.as_ref()
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    pub fn raw(&self) -> &dyn RawData {
        self.raw.as_ref()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self {
            resolver: Arc::new(MemoryResolver::new()),
            actions: Arc::new(NoActions),
            messages: Arc::new(KeyMessages),
            validation: Arc::new(NoValidation),
            cache: Arc::new(MemoryCache::default()),
            raw: Arc::new(RawMarker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_folder_resolver_first_match_wins() -> Result<(), Error> {
        let first = TempDir::new()?;
        let second = TempDir::new()?;
        std::fs::create_dir_all(second.path().join("views"))?;
        std::fs::write(second.path().join("views/a.html"), "second")?;

        let resolver = FolderResolver::new()
            .with_folder(first.path())
            .with_folder(second.path());
        let location = resolver.resolve("/views/a.html");

        assert!(location.is_some_and(|l| l.relative_path() == "views/a.html"
            && l.read_source().is_ok_and(|s| s == "second")));
        assert!(resolver.resolve("views/b.html").is_none());

        Ok(())
    }

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryResolver::new().with_template("tags/a.tag", "x");

        assert!(resolver.resolve("tags/a.tag").is_some_and(|l| l.is_embedded()));
        assert!(resolver.resolve("tags/b.tag").is_none());
    }

    #[test]
    fn test_defaults() {
        let host = Host::default();

        assert!(host.actions().render("Application.index", false).is_err());
        assert_eq!(host.messages().resolve("hello", &[]), "hello");
        assert!(!host.validation().has_errors());

        host.cache().set("k", "v", Some("1h"));
        assert_eq!(host.cache().get("k"), Some("v".to_string()));
    }
}
