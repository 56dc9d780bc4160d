//! FasterGT - Template Engine
//!
//! Templates are compiled into two line-mapped units, one holding the
//! statements and one holding the expressions, which a [`Repository`] caches
//! in memory and optionally on disk. Errors raised while rendering are
//! attributed back to the template line, or to the application class they
//! came from.
//!
//! # Examples
//!
//! ```
//! use fastergt::{Repository, Store, TemplateLocation};
//!
//! let repository = Repository::default();
//! let location = TemplateLocation::embedded_at(
//!     "views/greet.html",
//!     "#{list items: names, as: 'n'}<b>${n}</b>#{/list}#{else}nobody#{/else}",
//! );
//!
//! let output = repository
//!     .render(&location, Store::new().with_must("names", vec!["<a>", "b"]).into())
//!     .unwrap();
//!
//! assert_eq!(output, "<b>&lt;a&gt;</b><b>b</b>");
//! ```
pub mod compile;
pub mod escape;
pub mod extension;
pub mod fixer;
pub mod host;
pub mod location;
pub mod log;
pub mod render;
pub mod repo;
pub mod tags;

mod region;
mod store;

pub use location::TemplateLocation;
pub use log::{Error, ErrorKind, Frame, FrameKind};
pub use region::Region;
pub use render::{RenderingResult, TemplateInstance};
pub use repo::{Repository, RepositoryConfig};
pub use store::Store;
