use super::token::Operator;
use serde_json::Value;

/// An expression, evaluated to a single [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal data found directly in the source.
    Literal(Value),
    /// Double quoted string with interpolated parts.
    Interpolated(Vec<Part>),
    /// A variable, looked up in the binding and then in layout data.
    Variable(String),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `[k: v]`, keys are evaluated and converted to strings.
    Map(Vec<(Expr, Expr)>),
    /// `a..b` or `a..<b`.
    Range {
        from: Box<Expr>,
        to: Box<Expr>,
        exclusive: bool,
    },
    /// `!a`
    Not(Box<Expr>),
    /// `-a`
    Negate(Box<Expr>),
    /// Arithmetic or comparison of two values.
    Binary {
        operator: Operator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a && b`, short circuit.
    And(Box<Expr>, Box<Expr>),
    /// `a || b`, short circuit.
    Or(Box<Expr>, Box<Expr>),
    /// `test ? a : b`
    Ternary {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `a ?: b`
    Elvis(Box<Expr>, Box<Expr>),
    /// `receiver.name` or `receiver?.name`.
    Property {
        receiver: Box<Expr>,
        name: String,
        safe: bool,
    },
    /// `receiver[index]`
    Index {
        receiver: Box<Expr>,
        index: Box<Expr>,
    },
    /// `name(args)` or `receiver.name(args)`.
    Call {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        safe: bool,
    },
}

/// A piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Expr(Expr),
}

/// A statement of a script block.
///
/// Every statement remembers the 0-based line of the script it starts on,
/// so that an error can be attributed to that line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Evaluate an expression for its side effects.
    Expr(Expr),
    /// `def name = value` or `Type name = value`.
    Declare { name: String, value: Option<Expr> },
    /// `target = value`, `target += value` or `target -= value`.
    Assign {
        target: Expr,
        operator: Option<Operator>,
        value: Expr,
    },
    /// `if (test) { .. } else { .. }`
    If {
        test: Expr,
        then: Vec<Statement>,
        otherwise: Vec<Statement>,
    },
    /// `for (name in iterable) { .. }`
    For {
        name: String,
        iterable: Expr,
        body: Vec<Statement>,
    },
    /// `print(value)`, `println(value)` or the same through `out`.
    Print { value: Option<Expr>, newline: bool },
}

impl Expr {
    /// Return true if the [`Expr`] can be the target of an assignment.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::Variable(_) | Expr::Property { .. } | Expr::Index { .. }
        )
    }
}
