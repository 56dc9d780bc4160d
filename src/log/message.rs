use super::Error;
use serde_json::Value;
use std::fmt::Display;

pub const UNEXPECTED_TOKEN: &str = "unexpected token";
pub const UNEXPECTED_EOF: &str = "unexpected eof";
pub const INVALID_SYNTAX: &str = "invalid syntax";
pub const INCOMPATIBLE_TYPES: &str = "incompatible types";

pub const OPEN_COMMENT: &str = "Found open comment";
pub const OPEN_SCRIPT: &str = "Found open script-block";
pub const UNCLOSED_STRING: &str = "Found unclosed string inside tag-definition";
pub const NAMELESS_CLOSE: &str = "closing tag has no tag-name";
pub const INVALID_CODE_STRING: &str = "Invalid string for code-usage";

pub const NO_EXTENDING: &str = "No template is currently extending this template";
pub const EMPTY_MESSAGE: &str = "It looks like you don't have anything in your Message tag";
pub const NULL_MESSAGE_KEY: &str = "You are trying to resolve a message with an expression \
    that is resolved to null - have you forgotten quotes around the message-key?";
pub const SPECIFY_TEMPLATE: &str = "Specify a template name";
pub const MISSING_TEMPLATE: &str = "Cannot find template";
pub const MISSING_ERROR_KEY: &str = "Please specify the error key";
pub const ACTIONS_UNSUPPORTED: &str = "actions are not supported by this host";

/// Return an [`Error`] explaining that a tag or expression was never closed.
pub fn error_open_declaration(kind: &str) -> Error {
    Error::compilation(format!("Found open {kind}-declaration"))
        .with_help("did you close it with `}`?")
}

/// Return an [`Error`] explaining that a tag body was never closed.
pub fn error_unclosed_tag(name: &str) -> Error {
    Error::compilation(format!("Found unclosed tag #{{{name}}}"))
        .with_help(format!("close it with #{{/{name}}}"))
}

/// Return an [`Error`] explaining that a close tag has no matching open tag.
pub fn error_not_opened(name: &str) -> Error {
    Error::compilation(format!("#{{/{name}}} is not opened."))
}

/// Return an [`Error`] explaining that no implementation exists for a tag.
pub fn error_missing_tag(name: &str) -> Error {
    Error::compilation(format!("Cannot find tag-implementation for '{name}'")).with_help(
        "register a fast-tag for it, or add a tag-file under `tags/`",
    )
}

/// Return an [`Error`] explaining that a tag-file disappeared after compilation.
pub fn error_missing_tag_file(path: &str) -> Error {
    Error::template_runtime(format!("Cannot find tag-file '{path}'"))
}

/// Return an [`Error`] explaining that a value cannot be iterated.
pub fn error_iterator(value: &Value) -> Error {
    Error::template_runtime(format!("Cannot convert object-reference to Iterator: {value}"))
}

/// Return an [`Error`] explaining that no method matched a call.
pub fn error_missing_method<T>(name: &str, receiver: T) -> Error
where
    T: Display,
{
    Error::build(format!(
        "No signature of method: {receiver}.{name}() is applicable"
    ))
}

/// Return a string describing an unexpected token.
pub fn expected_operator<T>(received: T) -> String
where
    T: Display,
{
    format!(
        "expected operator like `+`, `-`, `*`, `/`, `==`, `!=`, `>=`, `<=`, `&&`, `||`, found `{}`",
        received
    )
}
