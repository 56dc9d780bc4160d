//! Adapter for fast-tags written against the older calling convention.
//!
//! A legacy tag receives the argument map, a closure rendering its body to a
//! string, a buffer to write to, and the template name and line it was used
//! from. Its errors are not engine errors, and are converted on the way out.
use super::TagCall;
use crate::log::Error;
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc};

/// Error type returned by a [`LegacyTag`].
pub type LegacyError = Box<dyn std::error::Error + Send + Sync>;

/// A tag using the older calling convention.
pub trait LegacyTag: Sync + Send {
    fn invoke(
        &self,
        args: &Map<String, Value>,
        body: &mut dyn FnMut() -> Result<String, Error>,
        out: &mut String,
        template: &str,
        from_line: usize,
    ) -> Result<(), LegacyError>;
}

impl<F> LegacyTag for F
where
    F: Fn(
            &Map<String, Value>,
            &mut dyn FnMut() -> Result<String, Error>,
            &mut String,
            &str,
            usize,
        ) -> Result<(), LegacyError>
        + Sync
        + Send,
{
    fn invoke(
        &self,
        args: &Map<String, Value>,
        body: &mut dyn FnMut() -> Result<String, Error>,
        out: &mut String,
        template: &str,
        from_line: usize,
    ) -> Result<(), LegacyError> {
        self(args, body, out, template, from_line)
    }
}

/// Finds legacy tags by the name used in a template.
pub trait LegacyTagResolver: Sync + Send {
    fn resolve(&self, name: &str) -> Option<Arc<dyn LegacyTag>>;
}

/// A set of legacy tags answering bare names.
#[derive(Default, Clone)]
pub struct LegacyTagLibrary {
    tags: HashMap<String, Arc<dyn LegacyTag>>,
}

impl LegacyTagLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag<N, T>(mut self, name: N, tag: T) -> Self
    where
        N: Into<String>,
        T: LegacyTag + 'static,
    {
        self.tags.insert(name.into(), Arc::new(tag));
        self
    }
}

impl LegacyTagResolver for LegacyTagLibrary {
    fn resolve(&self, name: &str) -> Option<Arc<dyn LegacyTag>> {
        self.tags.get(name).cloned()
    }
}

/// Invoke a legacy tag and write what it produced.
///
/// An engine [`Error`] raised while rendering the body is passed through as
/// it is. Any other error becomes a template runtime error.
pub(crate) fn invoke(
    tag: &dyn LegacyTag,
    call: &mut TagCall<'_, '_>,
    args: &Map<String, Value>,
) -> Result<(), Error> {
    let template = call.template_path().to_string();
    let line = call.line();
    let mut out = String::new();

    let mut body = || call.render_content().map(|output| output.to_string());
    tag.invoke(args, &mut body, &mut out, &template, line)
        .map_err(|e| match e.downcast::<Error>() {
            Ok(error) => *error,
            Err(e) => Error::template_runtime(e.to_string()),
        })?;
    call.write_str(&out);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, Repository, TemplateLocation};

    fn legacy_upper(
        _: &Map<String, Value>,
        body: &mut dyn FnMut() -> Result<String, Error>,
        out: &mut String,
        template: &str,
        from_line: usize,
    ) -> Result<(), LegacyError> {
        out.push_str(&body()?.to_uppercase());
        out.push_str(&format!(" ({template}:{from_line})"));
        Ok(())
    }

    fn legacy_broken(
        _: &Map<String, Value>,
        _: &mut dyn FnMut() -> Result<String, Error>,
        _: &mut String,
        _: &str,
        _: usize,
    ) -> Result<(), LegacyError> {
        Err("broken tag".into())
    }

    fn repository() -> Repository {
        Repository::default().with_legacy_tags(
            LegacyTagLibrary::new()
                .with_tag("upper", legacy_upper)
                .with_tag("broken", legacy_broken),
        )
    }

    #[test]
    fn test_legacy_tag_renders_body() -> Result<(), Error> {
        let location = TemplateLocation::embedded_at("views/legacy.txt", "a\n#{upper}b${1 + 1}#{/upper}");

        assert_eq!(repository().render(&location, Map::new())?, "a\nB2 (views/legacy.txt:2)");

        Ok(())
    }

    #[test]
    fn test_legacy_error_is_converted() {
        let location = TemplateLocation::embedded_at("views/broken.txt", "#{broken /}");
        let result = repository().render(&location, Map::new());

        assert!(result.is_err_and(|e| e.reason() == "broken tag" && e.kind() == ErrorKind::WithSource));
    }
}
