use super::token::{Keyword, Operator, Token};
use crate::{
    log::{expected_operator, Error, INVALID_SYNTAX, UNEXPECTED_TOKEN},
    region::Region,
};

/// Result of reading one [`Token`].
pub type TokenResult = Result<Option<(Token, Region)>, Error>;

/// Provides methods to read expression or script source as [`Token`] instances.
pub struct Lexer<'source> {
    /// Reference to the source text.
    pub source: &'source str,
    /// Position within source.
    pub cursor: usize,
}

impl<'source> Lexer<'source> {
    /// Create a new [`Lexer`] over the given source.
    #[inline]
    pub fn new(source: &'source str) -> Self {
        Self { source, cursor: 0 }
    }

    /// Return the next [`Token`] and [`Region`].
    ///
    /// Whitespace other than line breaks is skipped, and so are `//` comments.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when an unexpected character is found.
    pub fn next(&mut self) -> TokenResult {
        loop {
            let from = self.cursor;
            let source = self.source;
            let mut iter = source[from..].char_indices().map(|(i, c)| (from + i, c));
            let Some((index, char)) = iter.next() else {
                return Ok(None);
            };

            let next = self.peek_at(index + 1);
            let after = self.peek_at(index + 2);

            return match char {
                '\n' => self.advance(from, 1, Token::Newline),
                c if c.is_whitespace() => {
                    self.skip_while(|c| c.is_whitespace() && c != '\n');
                    continue;
                }
                '/' if next == Some('/') => {
                    self.skip_while(|c| c != '\n');
                    continue;
                }
                '*' => self.advance(from, 1, Token::Operator(Operator::Multiply)),
                '/' => self.advance(from, 1, Token::Operator(Operator::Divide)),
                '%' => self.advance(from, 1, Token::Operator(Operator::Modulo)),
                '+' if next == Some('=') => self.advance(from, 2, Token::AddAssign),
                '+' => self.advance(from, 1, Token::Operator(Operator::Add)),
                '-' if next == Some('=') => self.advance(from, 2, Token::SubtractAssign),
                '-' => self.advance(from, 1, Token::Operator(Operator::Subtract)),
                '.' => match (next, after) {
                    (Some('.'), Some('<')) => self.advance(from, 3, Token::RangeExclusive),
                    (Some('.'), _) => self.advance(from, 2, Token::Range),
                    _ => self.advance(from, 1, Token::Period),
                },
                '?' => match next {
                    Some('.') => self.advance(from, 2, Token::SafePeriod),
                    Some(':') => self.advance(from, 2, Token::Elvis),
                    _ => self.advance(from, 1, Token::Question),
                },
                ',' => self.advance(from, 1, Token::Comma),
                ':' => self.advance(from, 1, Token::Colon),
                ';' => self.advance(from, 1, Token::Semicolon),
                '(' => self.advance(from, 1, Token::OpenParen),
                ')' => self.advance(from, 1, Token::CloseParen),
                '[' => self.advance(from, 1, Token::OpenBracket),
                ']' => self.advance(from, 1, Token::CloseBracket),
                '{' => self.advance(from, 1, Token::OpenBrace),
                '}' => self.advance(from, 1, Token::CloseBrace),
                '\'' => self.lex_string(iter, index, '\''),
                '"' => self.lex_string(iter, index, '"'),
                '=' | '!' | '>' | '<' | '|' | '&' => self.lex_operator(iter, index, char),
                c if c.is_ascii_digit() => Ok(Some(self.lex_digit(index))),
                c if is_ident_start(c) => Ok(Some(self.lex_ident_or_keyword(iter, index))),
                _ => Err(self.point(
                    Error::build(UNEXPECTED_TOKEN).with_help(
                        "expected an operator, an identifier, a number, or the beginning \
                        of a string literal marked with `'` or `\"`",
                    ),
                    (index..index + char.len_utf8()).into(),
                )),
            };
        }
    }

    /// Move the cursor past a [`Token`] of the given byte length.
    fn advance(&mut self, from: usize, length: usize, token: Token) -> TokenResult {
        self.cursor = from + length;

        Ok(Some((token, (from..from + length).into())))
    }

    /// Attach a [`Pointer`][`crate::log::Pointer`] to the given [`Error`],
    /// pointing at the line of source that contains the [`Region`].
    pub fn point(&self, error: Error, region: Region) -> Error {
        let begin = region.begin.min(self.source.len());
        let start = self.source[..begin].rfind('\n').map_or(0, |i| i + 1);
        let end = self.source[begin..]
            .find('\n')
            .map_or(self.source.len(), |i| begin + i);
        let line = self.source[..start].matches('\n').count();

        error.with_pointer(
            &self.source[start..end],
            line,
            Region::new(begin - start..region.end.min(end).max(begin) - start),
        )
    }

    /// Return the character at the given byte offset.
    fn peek_at(&self, index: usize) -> Option<char> {
        self.source.get(index..)?.chars().next()
    }

    /// Move the cursor forward while the predicate holds.
    fn skip_while<P>(&mut self, predicate: P)
    where
        P: Fn(char) -> bool,
    {
        let rest = &self.source[self.cursor..];
        let length = rest.find(|c| !predicate(c)).unwrap_or(rest.len());
        self.cursor += length;
    }

    /// Return a [`Token`] and [`Region`] based on the previous character.
    ///
    /// Checks the next character via `.next` to ensure the correct `Token` is
    /// returned. All of these are recognized:
    ///
    /// `==`, `!=`, `>=`, `<=`, `||`, `&&`, `=`, `!`, `>`, `<`
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a lone `|` or `&` is found.
    fn lex_operator<T>(&mut self, mut iter: T, from: usize, previous: char) -> TokenResult
    where
        T: Iterator<Item = (usize, char)>,
    {
        let (position, token) = match (previous, iter.next()) {
            // Double:
            ('=', Some((usize, '='))) => (usize, Token::Operator(Operator::Equal)),
            ('!', Some((usize, '='))) => (usize, Token::Operator(Operator::NotEqual)),
            ('>', Some((usize, '='))) => (usize, Token::Operator(Operator::GreaterOrEqual)),
            ('<', Some((usize, '='))) => (usize, Token::Operator(Operator::LesserOrEqual)),
            ('|', Some((usize, '|'))) => (usize, Token::Or),
            ('&', Some((usize, '&'))) => (usize, Token::And),
            // Single:
            ('=', _) => (from, Token::Assign),
            ('!', _) => (from, Token::Exclamation),
            ('>', _) => (from, Token::Operator(Operator::Greater)),
            ('<', _) => (from, Token::Operator(Operator::Lesser)),
            _ => {
                return Err(self.point(
                    Error::build(UNEXPECTED_TOKEN).with_help(expected_operator(previous)),
                    (from..from + 1).into(),
                ));
            }
        };
        let position = position + 1;
        self.cursor = position;

        Ok(Some((token, (from..position).into())))
    }

    /// Return a [`Token`] and [`Region`] containing [`Token::Number`].
    ///
    /// A period is only part of the number when a digit follows it, so that
    /// `1..3` reads as a range.
    fn lex_digit(&mut self, from: usize) -> (Token, Region) {
        let bytes = self.source.as_bytes();
        let mut index = from;
        let mut seen_period = false;

        while index < bytes.len() {
            match bytes[index] {
                b'0'..=b'9' => index += 1,
                b'.' if !seen_period
                    && bytes.get(index + 1).map_or(false, |b| b.is_ascii_digit()) =>
                {
                    seen_period = true;
                    index += 1;
                }
                _ => break,
            }
        }
        self.cursor = index;

        (Token::Number, (from..index).into())
    }

    /// Return a [`Token`] and [`Region`] containing [`Token::String`] or
    /// [`Token::GString`] using the given iterator.
    ///
    /// Inside a double quoted string, `${ ... }` is skipped as a unit so that
    /// quotes used by the interpolated expression do not end the string.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the string is never closed.
    fn lex_string<T>(&mut self, mut iter: T, from: usize, quote: char) -> TokenResult
    where
        T: Iterator<Item = (usize, char)>,
    {
        let mut escaped = false;
        let mut depth = 0usize;
        let mut previous = '\0';

        loop {
            match iter.next() {
                Some((_, '\\')) if !escaped => escaped = true,
                Some((_, _)) if escaped => escaped = false,
                Some((_, '{')) if quote == '"' && (previous == '$' || depth > 0) => depth += 1,
                Some((_, '}')) if depth > 0 => depth -= 1,
                Some((index, c)) if c == quote && depth == 0 => {
                    let to = index + 1;
                    self.cursor = to;
                    let token = if quote == '"' {
                        Token::GString
                    } else {
                        Token::String
                    };

                    return Ok(Some((token, (from..to).into())));
                }
                Some((_, c)) => previous = c,
                None => {
                    return Err(self.point(
                        Error::build(INVALID_SYNTAX).with_help(format!(
                            "this might be an undelimited string, try closing it with `{quote}`"
                        )),
                        (from..from + 1).into(),
                    ));
                }
            }
        }
    }

    /// Return a [`Token`] and [`Region`] from the given iterator.
    ///
    /// The `Token` will be [`Token::Identifier`] or [`Token::Keyword`].
    fn lex_ident_or_keyword<T>(&mut self, mut iter: T, from: usize) -> (Token, Region)
    where
        T: Iterator<Item = (usize, char)>,
    {
        let to = loop {
            match iter.next() {
                Some((index, char)) if !is_ident_continue(char) => break index,
                Some((_, _)) => continue,
                None => break self.source.len(),
            }
        };
        self.cursor = to;

        let token = Keyword::from_text(&self.source[from..to])
            .map(Token::Keyword)
            .unwrap_or(Token::Identifier);

        (token, (from..to).into())
    }
}

/// Return true if the given character is a recognized beginning identifier,
/// meaning '_' or an `xid_start`.
pub(crate) fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

/// Return true if the given character is a recognized continue identifier,
/// meaning an `xid_continue`.
pub(crate) fn is_ident_continue(c: char) -> bool {
    unicode_ident::is_xid_continue(c)
}
