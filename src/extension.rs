//! Contains the `Extension` trait, used to add methods to template values.
//!
//! An extension is any type which implements the [`Extension`] trait. You can
//! assign an extension to a [`Repository`][`crate::Repository`] with the
//! [`with_extension`][`crate::Repository::with_extension()`] method, and it
//! will be available in every template compiled by that repository.
//!
//! Given this expression:
//!
//! ```text
//! ${ user.name.shout("!") }
//! ```
//!
//! The `shout` method is not known to the engine. When the receiver is not an
//! object holding a `shout` key, the extension registry is searched for an
//! extension with that name, and it is called with the receiver and the
//! evaluated arguments.
//!
//! A call without a receiver, like `${ shout("!") }`, receives `null`.
//!
//! # Examples
//!
//! You can either create a struct and implement the trait on that, or just
//! create a function matching the trait signature.
//!
//! ```rust
//! use fastergt::{Error, Repository, TemplateLocation};
//! use serde_json::{json, Map, Value};
//!
//! fn shout(receiver: &Value, args: &[Value]) -> Result<Value, Error> {
//!     let suffix = args.first().and_then(Value::as_str).unwrap_or("!");
//!     match receiver {
//!         Value::String(text) => Ok(json!(format!("{}{suffix}", text.to_uppercase()))),
//!         _ => Err(Error::build("extension `shout` requires string input")),
//!     }
//! }
//!
//! let repository = Repository::default().with_extension("shout", shout);
//! let location = TemplateLocation::embedded("${ name.shout('?') }");
//!
//! let mut args = Map::new();
//! args.insert("name".to_string(), json!("taylor"));
//!
//! assert_eq!(repository.render(&location, args).unwrap(), "TAYLOR?");
//! ```
use crate::log::Error;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Describes a method that can be called on any template value.
pub trait Extension: Sync + Send {
    /// Execute the method on the receiver and return the result.
    fn call(&self, receiver: &Value, args: &[Value]) -> Result<Value, Error>;
}

/// Allows assignment of any function matching the signature of `call` as an
/// `Extension`, instead of requiring a struct be created.
impl<F> Extension for F
where
    F: Fn(&Value, &[Value]) -> Result<Value, Error> + Sync + Send,
{
    fn call(&self, receiver: &Value, args: &[Value]) -> Result<Value, Error> {
        self(receiver, args)
    }
}

/// Extensions by method name.
#[derive(Default, Clone)]
pub struct Extensions {
    methods: HashMap<String, Arc<dyn Extension>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension, replacing any extension with the same name.
    pub fn insert<N, E>(&mut self, name: N, extension: E)
    where
        N: Into<String>,
        E: Extension + 'static,
    {
        self.methods.insert(name.into(), Arc::new(extension));
    }

    /// Return the extension with the given name.
    pub fn get(&self, name: &str) -> Option<&dyn Extension> {
        self.methods.get(name).map(|extension| extension.as_ref())
    }
}
