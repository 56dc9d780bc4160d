use std::fmt::{Display, Formatter, Result};

/// Types emitted by the expression [`Lexer`][`super::Lexer`].
///
/// Tokens carry no data of their own. The text of a token is found by
/// slicing the source with the accompanying [`Region`][`crate::region::Region`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Token {
    /// Integer or decimal number.
    Number,
    /// Single quoted string literal.
    String,
    /// Double quoted string literal, which may interpolate `${expr}` and `$name`.
    GString,
    /// Unquoted name.
    Identifier,
    /// A word reserved by the language.
    Keyword(Keyword),
    /// Describes an action taken on two values.
    Operator(Operator),
    /// &&
    And,
    /// ||
    Or,
    /// !
    Exclamation,
    /// =
    Assign,
    /// +=
    AddAssign,
    /// -=
    SubtractAssign,
    /// .
    Period,
    /// ?.
    SafePeriod,
    /// ..
    Range,
    /// ..<
    RangeExclusive,
    /// ?
    Question,
    /// ?:
    Elvis,
    /// :
    Colon,
    /// ,
    Comma,
    /// ;
    Semicolon,
    /// Line break, which ends a statement in a script.
    Newline,
    /// (
    OpenParen,
    /// )
    CloseParen,
    /// [
    OpenBracket,
    /// ]
    CloseBracket,
    /// {
    OpenBrace,
    /// }
    CloseBrace,
}

/// Words recognized by the [`Lexer`][`super::Lexer`] and [`Parser`][`super::Parser`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Keyword {
    True,
    False,
    Null,
    /// Declares a script variable.
    Def,
    If,
    Else,
    For,
    /// Divides the identifier from the iterable in a loop.
    In,
}

impl Keyword {
    /// Return the [`Keyword`] spelled by the given text.
    pub fn from_text(text: &str) -> Option<Self> {
        let keyword = match text {
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            "def" => Self::Def,
            "if" => Self::If,
            "else" => Self::Else,
            "for" => Self::For,
            "in" => Self::In,
            _ => return None,
        };

        Some(keyword)
    }
}

/// Binary operators that work on two values.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Operator {
    /// +
    Add,
    /// -
    Subtract,
    /// *
    Multiply,
    /// /
    Divide,
    /// %
    Modulo,
    /// >
    Greater,
    /// <
    Lesser,
    /// ==
    Equal,
    /// !=
    NotEqual,
    /// >=
    GreaterOrEqual,
    /// <=
    LesserOrEqual,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Token::Number => write!(f, "number"),
            Token::String | Token::GString => write!(f, "string"),
            Token::Identifier => write!(f, "identifier"),
            Token::Keyword(keyword) => write!(f, "keyword {keyword}"),
            Token::Operator(operator) => write!(f, "operator {operator}"),
            Token::And => write!(f, "and (&&)"),
            Token::Or => write!(f, "or (||)"),
            Token::Exclamation => write!(f, "exclamation (!)"),
            Token::Assign => write!(f, "assign (=)"),
            Token::AddAssign => write!(f, "+="),
            Token::SubtractAssign => write!(f, "-="),
            Token::Period => write!(f, "period (.)"),
            Token::SafePeriod => write!(f, "safe navigation (?.)"),
            Token::Range => write!(f, "range (..)"),
            Token::RangeExclusive => write!(f, "exclusive range (..<)"),
            Token::Question => write!(f, "question (?)"),
            Token::Elvis => write!(f, "elvis (?:)"),
            Token::Colon => write!(f, "colon (:)"),
            Token::Comma => write!(f, "comma (,)"),
            Token::Semicolon => write!(f, "semicolon (;)"),
            Token::Newline => write!(f, "newline"),
            Token::OpenParen => write!(f, "("),
            Token::CloseParen => write!(f, ")"),
            Token::OpenBracket => write!(f, "["),
            Token::CloseBracket => write!(f, "]"),
            Token::OpenBrace => write!(f, "{{"),
            Token::CloseBrace => write!(f, "}}"),
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Keyword::True => write!(f, "true"),
            Keyword::False => write!(f, "false"),
            Keyword::Null => write!(f, "null"),
            Keyword::Def => write!(f, "def"),
            Keyword::If => write!(f, "if"),
            Keyword::Else => write!(f, "else"),
            Keyword::For => write!(f, "for"),
            Keyword::In => write!(f, "in"),
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Subtract => write!(f, "-"),
            Operator::Multiply => write!(f, "*"),
            Operator::Divide => write!(f, "/"),
            Operator::Modulo => write!(f, "%"),
            Operator::Greater => write!(f, ">"),
            Operator::Lesser => write!(f, "<"),
            Operator::Equal => write!(f, "=="),
            Operator::NotEqual => write!(f, "!="),
            Operator::GreaterOrEqual => write!(f, ">="),
            Operator::LesserOrEqual => write!(f, "<="),
        }
    }
}
