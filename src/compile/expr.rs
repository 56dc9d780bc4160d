//! The expression and script language.
//!
//! Expressions appear in `${ }`, in tag arguments and in `&{ }` message
//! lookups. Scripts appear in `%{ }%` blocks. Both are parsed once, when a
//! template is compiled, and evaluated by the renderer against the binding of
//! a template instance.
pub mod token;
pub mod tree;

mod lex;
mod parse;

pub use lex::Lexer;
pub use parse::Parser;
pub use tree::{Expr, Part, Statement, StatementKind};

use crate::log::Error;

/// Parse a single expression.
///
/// # Examples
///
/// ```
/// use fastergt::compile::expr::{parse_expression, Expr};
///
/// let expr = parse_expression("name").unwrap();
/// assert_eq!(expr, Expr::Variable("name".to_string()));
/// ```
pub fn parse_expression(source: &str) -> Result<Expr, Error> {
    Parser::new(source).parse_expression()
}

/// Parse a script block into statements.
pub fn parse_script(source: &str) -> Result<Vec<Statement>, Error> {
    Parser::new(source).parse_script()
}
