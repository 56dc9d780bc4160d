use super::{
    lex::{Lexer, TokenResult},
    token::{Keyword, Operator, Token},
    tree::{Expr, Part, Statement, StatementKind},
};
use crate::{
    log::{Error, INVALID_SYNTAX, UNEXPECTED_EOF, UNEXPECTED_TOKEN},
    region::Region,
};
use serde_json::{Number, Value};

/// Reads expressions and script blocks into an [`Expr`] or a list of
/// [`Statement`] instances.
pub struct Parser<'source> {
    /// Lexer used to pull from source as tokens instead of raw text.
    lexer: Lexer<'source>,
    /// Store peeked tokens.
    ///
    /// Double option is used to remember when the next token is None.
    buffer: Option<Option<(Token, Region)>>,
}

impl<'source> Parser<'source> {
    /// Create a new [`Parser`] from the given string.
    #[inline]
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            buffer: None,
        }
    }

    /// Parse the whole source as a single expression.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the source is not one complete expression.
    pub fn parse_expression(mut self) -> Result<Expr, Error> {
        self.skip_separators()?;
        let expr = self.parse_expr()?;
        self.skip_separators()?;

        match self.next()? {
            None => Ok(expr),
            Some((token, region)) => Err(self.unexpected(
                region,
                format!("expected the end of the expression, found {token}"),
            )),
        }
    }

    /// Parse the whole source as a list of statements.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if any statement is malformed.
    pub fn parse_script(mut self) -> Result<Vec<Statement>, Error> {
        self.parse_statements(false)
    }

    /// Parse statements until the end of source, or until a closing brace when
    /// `in_block` is true.
    fn parse_statements(&mut self, in_block: bool) -> Result<Vec<Statement>, Error> {
        let mut statements = vec![];

        loop {
            self.skip_separators()?;
            match self.peek()? {
                None if in_block => return Err(self.eof("expected `}` to close the block")),
                None => break,
                Some((Token::CloseBrace, _)) if in_block => {
                    self.next()?;
                    break;
                }
                Some(_) => {}
            }

            let (statement, needs_separator) = self.parse_statement()?;
            statements.push(statement);

            if needs_separator {
                match self.peek()? {
                    None
                    | Some((Token::Newline, _))
                    | Some((Token::Semicolon, _))
                    | Some((Token::CloseBrace, _)) => {}
                    Some((token, region)) => {
                        return Err(self.unexpected(
                            region,
                            format!("expected a new line or `;` to end the statement, found {token}"),
                        ))
                    }
                }
            }
        }

        Ok(statements)
    }

    /// Parse one statement.
    ///
    /// The returned boolean is false for statements that end in a block, which
    /// need no separator before the next statement.
    fn parse_statement(&mut self) -> Result<(Statement, bool), Error> {
        let (token, region) = self.peek_must()?;
        let line = self.line_of(region);

        let (kind, needs_separator) = match token {
            Token::Keyword(Keyword::Def) => {
                self.next()?;
                let name = self.parse_ident()?;
                (self.parse_declaration(name)?, true)
            }
            Token::Keyword(Keyword::If) => (self.parse_if()?, false),
            Token::Keyword(Keyword::For) => (self.parse_for()?, false),
            _ => (self.parse_expression_statement()?, true),
        };

        Ok((Statement { kind, line }, needs_separator))
    }

    /// Parse an expression, assignment, declaration or print statement.
    fn parse_expression_statement(&mut self) -> Result<StatementKind, Error> {
        let expr = self.parse_expr()?;

        if let Expr::Variable(name) = &expr {
            let newline = name == "println";
            if (newline || name == "print") && !self.at_statement_end()? {
                let value = self.parse_expr()?;
                return Ok(StatementKind::Print {
                    value: Some(value),
                    newline,
                });
            }

            if self.next_is(Token::Identifier)? {
                // Typed declaration, such as `String name = value`.
                let name = self.parse_ident()?;
                return self.parse_declaration(name);
            }
        }

        let operator = match self.peek()? {
            Some((Token::Assign, _)) => None,
            Some((Token::AddAssign, _)) => Some(Operator::Add),
            Some((Token::SubtractAssign, _)) => Some(Operator::Subtract),
            _ => return Ok(into_print(expr)),
        };
        let (_, region) = self.next_any_must()?;

        if !expr.is_assignable() {
            return Err(self.lexer.point(
                Error::build(INVALID_SYNTAX)
                    .with_help("only a variable, a property or an index can be assigned to"),
                region,
            ));
        }
        let value = self.parse_expr()?;

        Ok(StatementKind::Assign {
            target: expr,
            operator,
            value,
        })
    }

    /// Parse the remainder of a declaration, after the variable name.
    fn parse_declaration(&mut self, name: String) -> Result<StatementKind, Error> {
        let value = if self.next_is(Token::Assign)? {
            self.next()?;
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(StatementKind::Declare { name, value })
    }

    /// Parse `if (test) block [else block]`.
    fn parse_if(&mut self) -> Result<StatementKind, Error> {
        self.next_must(Token::Keyword(Keyword::If))?;
        self.next_must(Token::OpenParen)?;
        let test = self.parse_expr()?;
        self.next_must(Token::CloseParen)?;
        let then = self.parse_block()?;

        // `else` may follow on a new line.
        self.skip_newlines()?;
        let otherwise = if self.next_is(Token::Keyword(Keyword::Else))? {
            self.next()?;
            if self.next_is(Token::Keyword(Keyword::If))? {
                let (_, region) = self.peek_must()?;
                let line = self.line_of(region);
                vec![Statement {
                    kind: self.parse_if()?,
                    line,
                }]
            } else {
                self.parse_block()?
            }
        } else {
            vec![]
        };

        Ok(StatementKind::If {
            test,
            then,
            otherwise,
        })
    }

    /// Parse `for (name in iterable) block`.
    fn parse_for(&mut self) -> Result<StatementKind, Error> {
        self.next_must(Token::Keyword(Keyword::For))?;
        self.next_must(Token::OpenParen)?;
        if self.next_is(Token::Keyword(Keyword::Def))? {
            self.next()?;
        }
        let mut name = self.parse_ident()?;
        if self.next_is(Token::Identifier)? {
            // Typed loop variable, such as `String name`.
            name = self.parse_ident()?;
        }
        self.next_must(Token::Keyword(Keyword::In))?;
        let iterable = self.parse_expr()?;
        self.next_must(Token::CloseParen)?;
        let body = self.parse_block()?;

        Ok(StatementKind::For {
            name,
            iterable,
            body,
        })
    }

    /// Parse a braced block, or a single statement.
    fn parse_block(&mut self) -> Result<Vec<Statement>, Error> {
        self.skip_newlines()?;
        if self.next_is(Token::OpenBrace)? {
            self.next()?;
            return self.parse_statements(true);
        }

        let (statement, _) = self.parse_statement()?;

        Ok(vec![statement])
    }

    /// Parse an expression, starting with the lowest precedence.
    fn parse_expr(&mut self) -> Result<Expr, Error> {
        let test = self.parse_or()?;

        match self.peek()? {
            Some((Token::Question, _)) => {
                self.next()?;
                let then = self.parse_expr()?;
                self.next_must(Token::Colon)?;
                let otherwise = self.parse_expr()?;

                Ok(Expr::Ternary {
                    test: Box::new(test),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                })
            }
            Some((Token::Elvis, _)) => {
                self.next()?;
                let otherwise = self.parse_expr()?;

                Ok(Expr::Elvis(Box::new(test), Box::new(otherwise)))
            }
            _ => Ok(test),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_and()?;
        while self.next_is(Token::Or)? {
            self.next()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_equality()?;
        while self.next_is(Token::And)? {
            self.next()?;
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, Error> {
        self.parse_binary(
            &[Operator::Equal, Operator::NotEqual],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, Error> {
        self.parse_binary(
            &[
                Operator::Greater,
                Operator::Lesser,
                Operator::GreaterOrEqual,
                Operator::LesserOrEqual,
            ],
            Self::parse_range,
        )
    }

    /// Parse `a..b` or `a..<b`.
    fn parse_range(&mut self) -> Result<Expr, Error> {
        let from = self.parse_additive()?;

        let exclusive = match self.peek()? {
            Some((Token::Range, _)) => false,
            Some((Token::RangeExclusive, _)) => true,
            _ => return Ok(from),
        };
        self.next()?;
        let to = self.parse_additive()?;

        Ok(Expr::Range {
            from: Box::new(from),
            to: Box::new(to),
            exclusive,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, Error> {
        self.parse_binary(
            &[Operator::Add, Operator::Subtract],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Error> {
        self.parse_binary(
            &[Operator::Multiply, Operator::Divide, Operator::Modulo],
            Self::parse_unary,
        )
    }

    /// Parse a left associative chain of the given operators.
    fn parse_binary<F>(&mut self, operators: &[Operator], operand: F) -> Result<Expr, Error>
    where
        F: Fn(&mut Self) -> Result<Expr, Error>,
    {
        let mut left = operand(self)?;

        while let Some((Token::Operator(operator), _)) = self.peek()? {
            if !operators.contains(&operator) {
                break;
            }
            self.next()?;
            let right = operand(self)?;
            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse `!a`, `-a` or a postfix expression.
    fn parse_unary(&mut self) -> Result<Expr, Error> {
        match self.peek()? {
            Some((Token::Exclamation, _)) => {
                self.next()?;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some((Token::Operator(Operator::Subtract), _)) => {
                self.next()?;
                match self.parse_unary()? {
                    Expr::Literal(Value::Number(number)) => Ok(Expr::Literal(negate(&number))),
                    expr => Ok(Expr::Negate(Box::new(expr))),
                }
            }
            _ => self.parse_postfix(),
        }
    }

    /// Parse a primary expression followed by any number of property
    /// accesses, method calls and index operations.
    fn parse_postfix(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek()? {
                Some((Token::Period, _)) | Some((Token::SafePeriod, _)) => {
                    let (token, _) = self.next_any_must()?;
                    let safe = token == Token::SafePeriod;
                    let name = self.parse_member_name()?;

                    expr = if self.next_is(Token::OpenParen)? {
                        Expr::Call {
                            receiver: Some(Box::new(expr)),
                            name,
                            args: self.parse_call_args()?,
                            safe,
                        }
                    } else {
                        Expr::Property {
                            receiver: Box::new(expr),
                            name,
                            safe,
                        }
                    };
                }
                Some((Token::OpenBracket, _)) => {
                    self.next()?;
                    let index = self.parse_expr()?;
                    self.next_must(Token::CloseBracket)?;
                    expr = Expr::Index {
                        receiver: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Parse a literal, a variable, a call without receiver, a parenthesized
    /// expression, or a list or map.
    fn parse_primary(&mut self) -> Result<Expr, Error> {
        let (token, region) = self.next_any_must()?;
        let source = self.lexer.source;
        let text = &source[region];

        let expr = match token {
            Token::Number => Expr::Literal(self.parse_number(text, region)?),
            Token::String => Expr::Literal(Value::String(self.parse_string(region)?)),
            Token::GString => self.parse_gstring(region)?,
            Token::Keyword(Keyword::True) => Expr::Literal(Value::Bool(true)),
            Token::Keyword(Keyword::False) => Expr::Literal(Value::Bool(false)),
            Token::Keyword(Keyword::Null) => Expr::Literal(Value::Null),
            Token::Identifier => {
                let name = text.to_string();
                if self.next_is(Token::OpenParen)? {
                    Expr::Call {
                        receiver: None,
                        name,
                        args: self.parse_call_args()?,
                        safe: false,
                    }
                } else {
                    Expr::Variable(name)
                }
            }
            Token::OpenParen => {
                let expr = self.parse_expr()?;
                self.next_must(Token::CloseParen)?;
                expr
            }
            Token::OpenBracket => self.parse_list_or_map(region)?,
            _ => {
                return Err(self.unexpected(
                    region,
                    format!("expected a value, a variable or `(`, found {token}"),
                ))
            }
        };

        Ok(expr)
    }

    /// Parse the name after `.` or `?.`, where keywords are accepted as names.
    fn parse_member_name(&mut self) -> Result<String, Error> {
        match self.next_any_must()? {
            (Token::Identifier, region) | (Token::Keyword(_), region) => {
                Ok(self.lexer.source[region].to_string())
            }
            (token, region) => Err(self.unexpected(
                region,
                format!("expected a property or method name, found {token}"),
            )),
        }
    }

    /// Parse a parenthesized, comma separated argument list.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>, Error> {
        self.next_must(Token::OpenParen)?;
        let mut args = vec![];

        if self.next_is(Token::CloseParen)? {
            self.next()?;
            return Ok(args);
        }

        loop {
            args.push(self.parse_expr()?);
            match self.next_any_must()? {
                (Token::Comma, _) => continue,
                (Token::CloseParen, _) => break,
                (token, region) => {
                    return Err(self.unexpected(
                        region,
                        format!("expected `,` or `)` in argument list, found {token}"),
                    ))
                }
            }
        }

        Ok(args)
    }

    /// Parse the remainder of a list or map literal, after the opening bracket.
    ///
    /// Map keys written as bare words, including keywords, are strings.
    fn parse_list_or_map(&mut self, open: Region) -> Result<Expr, Error> {
        if self.next_is(Token::Colon)? {
            self.next()?;
            self.next_must(Token::CloseBracket)?;
            return Ok(Expr::Map(vec![]));
        }
        if self.next_is(Token::CloseBracket)? {
            self.next()?;
            return Ok(Expr::List(vec![]));
        }

        let mut items = vec![];
        let mut entries = vec![];

        loop {
            let key = match self.peek()? {
                Some((Token::Keyword(keyword), region))
                    if !matches!(keyword, Keyword::True | Keyword::False | Keyword::Null) =>
                {
                    self.next()?;
                    Expr::Literal(Value::String(self.lexer.source[region].to_string()))
                }
                _ => self.parse_expr()?,
            };

            if self.next_is(Token::Colon)? {
                let (_, region) = self.next_any_must()?;
                if !items.is_empty() {
                    return Err(self.mixed(region));
                }
                let key = match key {
                    Expr::Variable(name) => Expr::Literal(Value::String(name)),
                    key => key,
                };
                entries.push((key, self.parse_expr()?));
            } else if entries.is_empty() {
                items.push(key);
            } else {
                return Err(self.mixed(open));
            }

            match self.next_any_must()? {
                (Token::Comma, _) => continue,
                (Token::CloseBracket, _) => break,
                (token, region) => {
                    return Err(self.unexpected(
                        region,
                        format!("expected `,` or `]`, found {token}"),
                    ))
                }
            }
        }

        if entries.is_empty() {
            Ok(Expr::List(items))
        } else {
            Ok(Expr::Map(entries))
        }
    }

    /// Parse an Identifier.
    ///
    /// # Errors
    ///
    /// Propagates an error from next_must if the next token is not an
    /// Identifier.
    fn parse_ident(&mut self) -> Result<String, Error> {
        let (_, region) = self.next_must(Token::Identifier)?;

        Ok(self.lexer.source[region].to_string())
    }

    /// Parse a Value::Number from the literal value of the given Region.
    ///
    /// # Errors
    ///
    /// Returns an error if the literal value cannot be converted to a number.
    fn parse_number(&self, text: &str, region: Region) -> Result<Value, Error> {
        let number = if text.contains('.') {
            text.parse::<f64>().ok().and_then(Number::from_f64)
        } else {
            text.parse::<i64>()
                .map(Number::from)
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
        };

        number.map(Value::Number).ok_or_else(|| {
            self.lexer
                .point(Error::build("unrecognizable number"), region)
        })
    }

    /// Parse a String from the literal value of the given Region, without the
    /// surrounding quotes.
    ///
    /// # Errors
    ///
    /// Returns an error if an unrecognized escape character is found.
    fn parse_string(&self, region: Region) -> Result<String, Error> {
        let window = &self.lexer.source[region.begin + 1..region.end - 1];
        unescape(window).map_err(|c| self.unknown_escape(c, region))
    }

    /// Parse a double quoted string into an [`Expr::Interpolated`], or an
    /// [`Expr::Literal`] when nothing is interpolated.
    fn parse_gstring(&self, region: Region) -> Result<Expr, Error> {
        let window = &self.lexer.source[region.begin + 1..region.end - 1];
        let bytes = window.as_bytes();
        let mut parts = vec![];
        let mut text = String::new();
        let mut index = 0;
        let mut start = 0;

        while index < bytes.len() {
            match bytes[index] {
                b'\\' => index += 2,
                b'$' if bytes.get(index + 1) == Some(&b'{') => {
                    let end = find_closing_brace(window, index + 2).ok_or_else(|| {
                        self.lexer.point(
                            Error::build(INVALID_SYNTAX).with_help("close the interpolation with `}`"),
                            region,
                        )
                    })?;
                    text.push_str(&self.unescape_at(&window[start..index], region)?);
                    if !text.is_empty() {
                        parts.push(Part::Text(std::mem::take(&mut text)));
                    }
                    let inner = Parser::new(&window[index + 2..end]).parse_expression()?;
                    parts.push(Part::Expr(inner));
                    index = end + 1;
                    start = index;
                }
                b'$' if window[index + 1..].starts_with(super::lex::is_ident_start) => {
                    text.push_str(&self.unescape_at(&window[start..index], region)?);
                    if !text.is_empty() {
                        parts.push(Part::Text(std::mem::take(&mut text)));
                    }
                    let (expr, end) = parse_dotted_path(window, index + 1);
                    parts.push(Part::Expr(expr));
                    index = end;
                    start = index;
                }
                _ => index += 1,
            }
        }
        text.push_str(&self.unescape_at(&window[start..window.len().max(start)], region)?);

        if parts.is_empty() {
            return Ok(Expr::Literal(Value::String(text)));
        }
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }

        Ok(Expr::Interpolated(parts))
    }

    fn unescape_at(&self, window: &str, region: Region) -> Result<String, Error> {
        unescape(window).map_err(|c| self.unknown_escape(c, region))
    }

    fn unknown_escape(&self, c: char, region: Region) -> Error {
        self.lexer.point(
            Error::build(format!("unexpected escape character `\\{c}`"))
                .with_help("recognized escapes are `\\n`, `\\r`, `\\t`, `\\\\`, `\\'`, `\\\"` and `\\$`"),
            region,
        )
    }

    /// Skip newline and semicolon tokens.
    fn skip_separators(&mut self) -> Result<(), Error> {
        while matches!(
            self.peek()?,
            Some((Token::Newline, _)) | Some((Token::Semicolon, _))
        ) {
            self.next()?;
        }

        Ok(())
    }

    /// Skip newline tokens.
    fn skip_newlines(&mut self) -> Result<(), Error> {
        while self.next_is(Token::Newline)? {
            self.next()?;
        }

        Ok(())
    }

    /// Return true if the next token ends a statement.
    fn at_statement_end(&mut self) -> Result<bool, Error> {
        Ok(matches!(
            self.peek()?,
            None | Some((Token::Newline, _))
                | Some((Token::Semicolon, _))
                | Some((Token::CloseBrace, _))
        ))
    }

    /// Return the 0-based line of source the [`Region`] begins on.
    fn line_of(&self, region: Region) -> usize {
        self.lexer.source[..region.begin].matches('\n').count()
    }

    fn unexpected<T>(&self, region: Region, help: T) -> Error
    where
        T: Into<String>,
    {
        self.lexer
            .point(Error::build(UNEXPECTED_TOKEN).with_help(help), region)
    }

    fn mixed(&self, region: Region) -> Error {
        self.lexer.point(
            Error::build(INVALID_SYNTAX)
                .with_help("a literal is either a list `[a, b]` or a map `[k: v]`, not both"),
            region,
        )
    }

    fn eof<T>(&self, help: T) -> Error
    where
        T: Into<String>,
    {
        let length = self.lexer.source.len();

        self.lexer.point(
            Error::build(UNEXPECTED_EOF).with_help(help),
            (length..length).into(),
        )
    }

    /// Peek the next token.
    ///
    /// # Errors
    ///
    /// Propagates any error reported by the underlying Lexer.
    fn peek(&mut self) -> TokenResult {
        if let o @ None = &mut self.buffer {
            *o = Some(self.lexer.next()?);
        }

        Ok(self.buffer.flatten())
    }

    /// Peek the next token, which must exist.
    fn peek_must(&mut self) -> Result<(Token, Region), Error> {
        match self.peek()? {
            Some(next) => Ok(next),
            None => Err(self.eof("expected additional tokens")),
        }
    }

    /// Get the next token.
    ///
    /// Prefers to pull a token from the internal buffer first, but will pull from
    /// the lexer when the buffer is empty.
    fn next(&mut self) -> TokenResult {
        match self.buffer.take() {
            Some(t) => Ok(t),
            None => self.lexer.next(),
        }
    }

    /// Returns true if the given token matches the upcoming token.
    ///
    /// # Errors
    ///
    /// Propagates any errors reported by the underlying lexer.
    fn next_is(&mut self, expect: Token) -> Result<bool, Error> {
        Ok(self
            .peek()?
            .map(|(token, _)| token == expect)
            .unwrap_or(false))
    }

    /// Get the next token, and compare it to the given token.
    ///
    /// # Errors
    ///
    /// An error is returned if the next token does not match the given token,
    /// or when [next()] returns None.
    fn next_must(&mut self, expect: Token) -> Result<(Token, Region), Error> {
        match self.next()? {
            Some((token, region)) if token == expect => Ok((token, region)),
            Some((token, region)) => {
                Err(self.unexpected(region, format!("expected `{expect}`, found {token}")))
            }
            None => Err(self.eof(format!("expected `{expect}`"))),
        }
    }

    /// Get the next token.
    ///
    /// Similar to "next()" but requires that a token is returned.
    ///
    /// # Errors
    ///
    /// An error is returned if no more tokens are left.
    fn next_any_must(&mut self) -> Result<(Token, Region), Error> {
        match self.next()? {
            Some(next) => Ok(next),
            None => Err(self.eof(
                "expected additional tokens, did you make sure all brackets and strings are closed?",
            )),
        }
    }
}

/// Turn a call to `print` or `println` into a print statement.
fn into_print(expr: Expr) -> StatementKind {
    match expr {
        Expr::Call {
            receiver,
            name,
            mut args,
            ..
        } if (name == "print" || name == "println")
            && args.len() <= 1
            && receiver
                .as_deref()
                .map_or(true, |r| *r == Expr::Variable("out".to_string())) =>
        {
            StatementKind::Print {
                value: args.pop(),
                newline: name == "println",
            }
        }
        expr => StatementKind::Expr(expr),
    }
}

/// Return the negative of a number.
fn negate(number: &Number) -> Value {
    match (number.as_i64(), number.as_f64()) {
        (Some(integer), _) => Value::Number(Number::from(-integer)),
        (None, Some(float)) => Number::from_f64(-float).map_or(Value::Null, Value::Number),
        _ => Value::Null,
    }
}

/// Replace escape sequences in a string literal.
///
/// Returns the unrecognized character on failure.
fn unescape(window: &str) -> Result<String, char> {
    if !window.contains('\\') {
        return Ok(window.to_string());
    }

    let mut string = String::with_capacity(window.len());
    let mut iter = window.chars();
    while let Some(c) = iter.next() {
        if c != '\\' {
            string.push(c);
            continue;
        }
        let escaped = match iter.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some(c @ ('\\' | '\'' | '"' | '$')) => c,
            Some(c) => return Err(c),
            None => return Err('\\'),
        };
        string.push(escaped);
    }

    Ok(string)
}

/// Return the offset of the `}` that closes an interpolation opened just
/// before `from`, ignoring braces inside quoted strings.
fn find_closing_brace(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote = None;
    let mut index = from;

    while index < bytes.len() {
        let byte = bytes[index];
        match quote {
            Some(_) if byte == b'\\' => index += 1,
            Some(q) if byte == q => quote = None,
            Some(_) => {}
            None => match byte {
                b'\'' | b'"' => quote = Some(byte),
                b'{' => depth += 1,
                b'}' if depth == 0 => return Some(index),
                b'}' => depth -= 1,
                _ => {}
            },
        }
        index += 1;
    }

    None
}

/// Parse `name.path.to` starting at `from`, as found after `$` in a
/// double quoted string.
///
/// Returns the expression and the offset just past it. A period is only
/// consumed when an identifier follows it.
fn parse_dotted_path(text: &str, from: usize) -> (Expr, usize) {
    let ident_end = |start: usize| {
        text[start..]
            .char_indices()
            .find(|(_, c)| !super::lex::is_ident_continue(*c))
            .map_or(text.len(), |(i, _)| start + i)
    };

    let mut end = ident_end(from);
    let mut expr = Expr::Variable(text[from..end].to_string());

    while text[end..].starts_with('.')
        && text[end + 1..].starts_with(super::lex::is_ident_start)
    {
        let next = ident_end(end + 1);
        expr = Expr::Property {
            receiver: Box::new(expr),
            name: text[end + 1..next].to_string(),
            safe: false,
        };
        end = next;
    }

    (expr, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expr(source: &str) -> Result<Expr, Error> {
        Parser::new(source).parse_expression()
    }

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Variable(name.to_string()))
    }

    #[test]
    fn test_parse_precedence() -> Result<(), Error> {
        assert_eq!(
            expr("a + b * 2")?,
            Expr::Binary {
                operator: Operator::Add,
                left: var("a"),
                right: Box::new(Expr::Binary {
                    operator: Operator::Multiply,
                    left: var("b"),
                    right: Box::new(Expr::Literal(json!(2))),
                }),
            }
        );

        Ok(())
    }

    #[test]
    fn test_parse_ternary_and_elvis() -> Result<(), Error> {
        assert_eq!(
            expr("a ? 1 : b ?: 2")?,
            Expr::Ternary {
                test: var("a"),
                then: Box::new(Expr::Literal(json!(1))),
                otherwise: Box::new(Expr::Elvis(var("b"), Box::new(Expr::Literal(json!(2))))),
            }
        );

        Ok(())
    }

    #[test]
    fn test_parse_tag_argument_map() -> Result<(), Error> {
        assert_eq!(
            expr("[items: users, as: 'user', for: -1.5]")?,
            Expr::Map(vec![
                (Expr::Literal(json!("items")), *var("users")),
                (Expr::Literal(json!("as")), Expr::Literal(json!("user"))),
                (Expr::Literal(json!("for")), Expr::Literal(json!(-1.5))),
            ])
        );
        assert_eq!(expr("[:]")?, Expr::Map(vec![]));
        assert_eq!(expr("[]")?, Expr::List(vec![]));

        Ok(())
    }

    #[test]
    fn test_parse_postfix_chain() -> Result<(), Error> {
        assert_eq!(
            expr("user?.tags[0].toUpperCase()")?,
            Expr::Call {
                receiver: Some(Box::new(Expr::Index {
                    receiver: Box::new(Expr::Property {
                        receiver: var("user"),
                        name: "tags".to_string(),
                        safe: true,
                    }),
                    index: Box::new(Expr::Literal(json!(0))),
                })),
                name: "toUpperCase".to_string(),
                args: vec![],
                safe: false,
            }
        );

        Ok(())
    }

    #[test]
    fn test_parse_gstring() -> Result<(), Error> {
        assert_eq!(
            expr(r#""Hi ${user.name}, $count new.""#)?,
            Expr::Interpolated(vec![
                Part::Text("Hi ".to_string()),
                Part::Expr(Expr::Property {
                    receiver: var("user"),
                    name: "name".to_string(),
                    safe: false,
                }),
                Part::Text(", ".to_string()),
                Part::Expr(*var("count")),
                Part::Text(" new.".to_string()),
            ])
        );
        assert_eq!(expr(r#""plain \"text\"""#)?, Expr::Literal(json!("plain \"text\"")));

        Ok(())
    }

    #[test]
    fn test_parse_script() -> Result<(), Error> {
        let statements = Parser::new(
            "def a = 1\nString b = 'x'; a += 2\nif (a > 2) {\n  out.print(b)\n} else println 'no'\nfor (i in 1..3) { a = a + i }",
        )
        .parse_script()?;

        let lines: Vec<usize> = statements.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![0, 1, 1, 2, 5]);
        assert!(matches!(statements[1].kind, StatementKind::Declare { .. }));
        assert!(matches!(
            statements[2].kind,
            StatementKind::Assign {
                operator: Some(Operator::Add),
                ..
            }
        ));
        match &statements[3].kind {
            StatementKind::If {
                then, otherwise, ..
            } => {
                assert!(matches!(
                    then[0].kind,
                    StatementKind::Print { newline: false, .. }
                ));
                assert!(matches!(
                    otherwise[0].kind,
                    StatementKind::Print { newline: true, .. }
                ));
            }
            other => panic!("expected if statement, found {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert!(expr("a +").is_err());
        assert!(expr("[a: 1, b]").is_err());
        assert!(expr("a b").is_err());
        assert!(Parser::new("1 = 2").parse_script().is_err());
        assert!(Parser::new("if (a) {").parse_script().is_err());
    }
}
