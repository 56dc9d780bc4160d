//! Template compilation.
//!
//! A template is scanned into fragments, the fragments are turned into two
//! line-mapped artifacts, and the artifacts are assembled into a
//! [`CompiledTemplate`]: the expression unit first, then the statement unit
//! that calls into it.
pub mod expr;
pub mod generate;
pub mod scan;

mod assemble;
mod line_map;
mod unit;

pub use assemble::assemble;
pub use generate::{Generated, Generator, RENDER_METHOD};
pub use line_map::{LineMap, SENTINEL};
pub use unit::{
    Body, CompiledTemplate, ExpressionMethod, ExpressionUnit, Instruction, Method, Op,
    StatementUnit,
};

use crate::{
    location::TemplateLocation,
    log::Error,
    tags::{legacy::LegacyTag, FastTag},
};
use std::sync::Arc;

/// Answers the questions the compiler asks while resolving a tag name.
///
/// Implemented by the [`Repository`][`crate::Repository`], which owns the
/// registered fast-tags and knows which tag-files exist.
pub trait TagLookup {
    /// Return the internal or custom fast-tag with the given name.
    fn fast_tag(&self, name: &str) -> Option<Arc<dyn FastTag>>;

    /// Return the legacy fast-tag with the given name.
    fn legacy_tag(&self, name: &str) -> Option<Arc<dyn LegacyTag>>;

    /// Return true if a template exists at the given relative path.
    fn template_exists(&self, relative_path: &str) -> bool;
}

/// Compile the template at the given location.
///
/// # Errors
///
/// Returns an [`Error`] if the source cannot be read, or does not compile.
pub fn compile(location: &TemplateLocation, lookup: &dyn TagLookup) -> Result<CompiledTemplate, Error> {
    let source = location.read_source()?;
    let generated = Generator::new(location, lookup)?.generate(&source)?;

    assemble(location.clone(), &generated, lookup)
}
