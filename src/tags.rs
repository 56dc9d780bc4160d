//! Contains the `FastTag` trait and the resolvers that find fast-tags by name.
//!
//! A fast-tag is any type which implements the [`FastTag`] trait. It receives
//! a [`TagCall`], giving access to the output, the layout data and the body of
//! the tag, along with the evaluated argument map.
//!
//! Fast-tags are grouped in a [`FastTagLibrary`] and registered on a
//! [`Repository`][`crate::Repository`] with
//! [`with_fast_tags`][`crate::Repository::with_fast_tags()`]. When a template
//! uses a tag, the internal fast-tags are searched first, then every library
//! in the order it was registered.
//!
//! # Examples
//!
//! ```rust
//! use fastergt::{
//!     tags::{FastTagLibrary, TagCall},
//!     Error, Repository, TemplateLocation,
//! };
//! use serde_json::{Map, Value};
//!
//! fn bold(call: &mut TagCall<'_, '_>, _: &Map<String, Value>) -> Result<(), Error> {
//!     let body = call.render_content()?;
//!     call.write_str("<b>");
//!     call.insert(body);
//!     call.write_str("</b>");
//!     Ok(())
//! }
//!
//! let repository = Repository::default()
//!     .with_fast_tags(FastTagLibrary::new().with_tag("bold", bold));
//! let location = TemplateLocation::embedded("#{bold}hi#{/bold}");
//!
//! assert_eq!(repository.render(&location, Map::new()).unwrap(), "<b>hi</b>");
//! ```
pub mod fast;
pub mod legacy;

pub use crate::render::TagCall;

use legacy::{LegacyTag, LegacyTagResolver};
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc};

/// Describes a tag implemented by the host, invoked with the evaluated
/// arguments of the tag.
pub trait FastTag: Sync + Send {
    /// Render the tag.
    fn render(&self, call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), crate::Error>;
}

/// Allows assignment of any function matching the signature of `render` as a
/// `FastTag`, instead of requiring a struct be created.
impl<F> FastTag for F
where
    F: Fn(&mut TagCall<'_, '_>, &Map<String, Value>) -> Result<(), crate::Error> + Sync + Send,
{
    fn render(&self, call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), crate::Error> {
        self(call, args)
    }
}

/// Finds custom fast-tags by the name used in a template.
pub trait FastTagResolver: Sync + Send {
    fn resolve(&self, name: &str) -> Option<Arc<dyn FastTag>>;
}

/// A named set of fast-tags, with an optional namespace.
///
/// A library with namespace `a.b` answers `a.b.name` only. A library without
/// a namespace answers bare names only.
#[derive(Default, Clone)]
pub struct FastTagLibrary {
    namespace: Option<String>,
    tags: HashMap<String, Arc<dyn FastTag>>,
}

impl FastTagLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace<T>(mut self, namespace: T) -> Self
    where
        T: Into<String>,
    {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a tag to the library, replacing any tag with the same name.
    pub fn with_tag<N, T>(mut self, name: N, tag: T) -> Self
    where
        N: Into<String>,
        T: FastTag + 'static,
    {
        self.tags.insert(name.into(), Arc::new(tag));
        self
    }
}

impl FastTagResolver for FastTagLibrary {
    fn resolve(&self, name: &str) -> Option<Arc<dyn FastTag>> {
        let local = match self.namespace.as_deref() {
            Some(namespace) => name.strip_prefix(namespace)?.strip_prefix('.')?,
            None => name,
        };
        if local.contains('.') {
            return None;
        }

        self.tags.get(local).cloned()
    }
}

/// Every fast-tag resolver known to a repository.
#[derive(Default, Clone)]
pub struct Tags {
    resolvers: Vec<Arc<dyn FastTagResolver>>,
    legacy: Vec<Arc<dyn LegacyTagResolver>>,
}

impl Tags {
    pub(crate) fn push_resolver(&mut self, resolver: Arc<dyn FastTagResolver>) {
        self.resolvers.push(resolver);
    }

    pub(crate) fn push_legacy(&mut self, resolver: Arc<dyn LegacyTagResolver>) {
        self.legacy.push(resolver);
    }

    /// Return the internal or custom fast-tag with the given name.
    pub fn fast_tag(&self, name: &str) -> Option<Arc<dyn FastTag>> {
        fast::resolve(name).or_else(|| {
            self.resolvers
                .iter()
                .find_map(|resolver| resolver.resolve(name))
        })
    }

    /// Return the legacy fast-tag with the given name.
    pub fn legacy_tag(&self, name: &str) -> Option<Arc<dyn LegacyTag>> {
        self.legacy.iter().find_map(|resolver| resolver.resolve(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn noop(_: &mut TagCall<'_, '_>, _: &Map<String, Value>) -> Result<(), Error> {
        Ok(())
    }

    #[test]
    fn test_namespace() {
        let plain = FastTagLibrary::new().with_tag("hello", noop);
        let spaced = FastTagLibrary::new().with_namespace("my.lib").with_tag("hello", noop);

        assert!(plain.resolve("hello").is_some());
        assert!(plain.resolve("my.lib.hello").is_none());
        assert!(spaced.resolve("my.lib.hello").is_some());
        assert!(spaced.resolve("hello").is_none());
        assert!(spaced.resolve("my.libhello").is_none());
        assert!(spaced.resolve("my.lib.x.hello").is_none());
    }

    #[test]
    fn test_internal_tags_come_first() {
        let mut tags = Tags::default();
        tags.push_resolver(Arc::new(FastTagLibrary::new().with_tag("get", noop).with_tag("mine", noop)));

        assert!(fast::resolve("get").is_some());
        assert!(fast::resolve("mine").is_none());
        assert!(tags.fast_tag("mine").is_some());
        assert!(tags.fast_tag("missing").is_none());
        assert!(tags.legacy_tag("mine").is_none());
    }
}
