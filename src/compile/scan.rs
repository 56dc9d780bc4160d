//! Template scanner.
//!
//! Reads template source line by line and produces a tree of [`Fragment`]
//! instances. Plain text accumulates until the next opening delimiter is found,
//! and the body of a tag is parsed recursively until its close tag.
pub mod fragment;

mod state;

pub use fragment::{Fragment, Tag};
pub use state::Marker;

use crate::{
    log::{
        error_not_opened, error_open_declaration, error_unclosed_tag, Error, NAMELESS_CLOSE,
        OPEN_COMMENT, OPEN_SCRIPT, UNCLOSED_STRING,
    },
    region::Region,
};
use once_cell::sync::Lazy;
use regex::Regex;
use state::CursorState;

/// Finds the next opening delimiter on a line.
static MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([#$&]|@?@)\{|(\*\{)|(%\{)").expect("marker pattern is valid"));

static NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n").expect("newline pattern is valid"));

/// Result of one scanning step.
enum Step {
    Fragment(Fragment),
    Open {
        name: String,
        args: String,
        line: usize,
        has_body: bool,
    },
    Close {
        name: String,
        line: usize,
    },
}

/// Provides methods to read template source as [`Fragment`] instances.
pub struct Scanner<'source> {
    /// Relative path of the template, used in errors.
    name: &'source str,
    lines: Vec<&'source str>,
    /// Current line, zero indexed.
    line: usize,
    /// Byte offset within the current line.
    offset: usize,
    /// Number of unclosed `{` inside the current tag or expression.
    ///
    /// Never reset between tags, a tag left unbalanced fails as unclosed.
    depth: usize,
}

impl<'source> Scanner<'source> {
    /// Create a new [`Scanner`] over the given source.
    ///
    /// Trailing empty lines are discarded, so a final newline does not
    /// produce output.
    pub fn new(source: &'source str, name: &'source str) -> Self {
        let mut lines: Vec<&str> = source.split('\n').collect();
        while lines.last() == Some(&"") {
            lines.pop();
        }

        Self {
            name,
            lines,
            line: 0,
            offset: 0,
            depth: 0,
        }
    }

    /// Scan the whole source.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] for unterminated comments, scripts, tags,
    /// expressions and strings, and for mismatched close tags.
    pub fn scan(mut self) -> Result<Vec<Fragment>, Error> {
        let mut fragments = vec![];

        while let Some(step) = self.next_step()? {
            match step {
                Step::Fragment(fragment) => fragments.push(fragment),
                Step::Open {
                    name,
                    args,
                    line,
                    has_body,
                } => fragments.extend(self.scan_tag(name, args, line, has_body)?),
                Step::Close { name, line } => {
                    return Err(self.locate(error_not_opened(&name), line, None));
                }
            }
        }

        Ok(fragments)
    }

    /// Collect the body of a tag until its close tag.
    ///
    /// Inside `if` and `ifnot`, an `elseif` or `else` that is never closed
    /// starts the next branch of the chain, and each branch is returned as a
    /// sibling tag: `#{if a}A#{else}B#{/if}` reads as
    /// `#{if a}A#{/if}#{else}B#{/else}`.
    fn scan_tag(
        &mut self,
        name: String,
        args: String,
        line: usize,
        has_body: bool,
    ) -> Result<Vec<Fragment>, Error> {
        let chains = matches!(name.as_str(), "if" | "ifnot");
        let mut branches = vec![];
        let mut current = Tag {
            name,
            args,
            body: vec![],
            line,
        };

        if has_body {
            loop {
                match self.next_step()? {
                    Some(Step::Fragment(fragment)) => current.body.push(fragment),
                    Some(Step::Open {
                        name,
                        args,
                        line,
                        has_body: true,
                    }) if chains
                        && matches!(name.as_str(), "elseif" | "else")
                        && !self.is_closed_ahead(&name) =>
                    {
                        let branch = Tag {
                            name,
                            args,
                            body: vec![],
                            line,
                        };
                        branches.push(Fragment::Tag(std::mem::replace(&mut current, branch)));
                    }
                    Some(Step::Open {
                        name,
                        args,
                        line,
                        has_body,
                    }) => current.body.extend(self.scan_tag(name, args, line, has_body)?),
                    Some(Step::Close { name: close, .. }) if close == opener(&branches, &current) => break,
                    Some(Step::Close { .. }) | None => {
                        let name = opener(&branches, &current).to_string();
                        return Err(self.locate(error_unclosed_tag(&name), line, None));
                    }
                }
            }
        }
        branches.push(Fragment::Tag(current));

        Ok(branches)
    }

    /// Return true if the tag just opened is closed by its own close tag
    /// before the enclosing tag ends.
    ///
    /// Only tag steps are looked at, and the position is restored. Branches
    /// of an inline chain opened further ahead are never closed, so they are
    /// dropped when an outer close tag is found. Scan errors are left for the
    /// real pass to report.
    fn is_closed_ahead(&mut self, name: &str) -> bool {
        let saved = (self.line, self.offset, self.depth);
        let mut open: Vec<String> = vec![];

        let closed = loop {
            match self.next_step() {
                Ok(Some(Step::Open {
                    name,
                    has_body: true,
                    ..
                })) => open.push(name),
                Ok(Some(Step::Close { name: close, .. })) => {
                    while open
                        .last()
                        .is_some_and(|last| *last != close && matches!(last.as_str(), "elseif" | "else"))
                    {
                        open.pop();
                    }
                    match open.last() {
                        Some(last) if *last == close => {
                            open.pop();
                        }
                        Some(_) => break false,
                        None => break close == name,
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break false,
            }
        };
        (self.line, self.offset, self.depth) = saved;

        closed
    }

    /// Return the next [`Step`], or `None` at the end of source.
    fn next_step(&mut self) -> Result<Option<Step>, Error> {
        let mut start = (self.line, self.offset);
        let mut state = CursorState::Default;

        while let Some(current) = self.lines.get(self.line).copied() {
            match state {
                CursorState::Default => {}
                CursorState::Comment { .. } => {
                    match find_from(current, self.offset, "}*") {
                        Some(end) => {
                            self.offset = end + 2;
                            state = CursorState::Default;
                            // Text after the comment starts here.
                            start = (self.line, self.offset);
                        }
                        None => self.next_line(),
                    }
                    continue;
                }
                CursorState::Script { line, offset } => {
                    match find_from(current, self.offset, "}%") {
                        Some(end) => {
                            let code = self.collect((line, offset), Some(end));
                            self.offset = end + 2;
                            if !code.is_empty() {
                                return Ok(Some(Step::Fragment(Fragment::Script { code, line })));
                            }
                            state = CursorState::Default;
                            start = (self.line, self.offset);
                        }
                        None => self.next_line(),
                    }
                    continue;
                }
                CursorState::Inside {
                    marker,
                    line,
                    offset,
                } => {
                    match self.find_end_bracket(current, line)? {
                        Some(end) => {
                            let body = self.collect((line, offset), Some(end));
                            self.offset = end + 1;

                            return self.classify(marker, &body, line).map(Some);
                        }
                        None => self.next_line(),
                    }
                    continue;
                }
            }

            let found = MARKERS
                .find_at(current, self.offset)
                .and_then(|m| Marker::from_text(m.as_str()).map(|marker| (marker, m.start(), m.end())));

            match found {
                Some((marker, begin, end)) => {
                    let text = self.collect(start, Some(begin));
                    if !text.is_empty() {
                        // The marker is found again on the following call.
                        return Ok(Some(Step::Fragment(Fragment::Text {
                            text,
                            line: start.0,
                        })));
                    }

                    self.offset = end;
                    state = match marker {
                        Marker::Comment => CursorState::Comment {
                            line: self.line,
                            offset: begin,
                        },
                        Marker::Script => CursorState::Script {
                            line: self.line,
                            offset: end,
                        },
                        _ => CursorState::Inside {
                            marker,
                            line: self.line,
                            offset: begin,
                        },
                    };
                }
                None => self.next_line(),
            }
        }

        match state {
            CursorState::Default => {}
            CursorState::Comment { line, offset } => {
                let error = Error::compilation(OPEN_COMMENT).with_help("close it with `}*`");
                return Err(self.locate(error, line, Some(Region::new(offset..offset + 2))));
            }
            CursorState::Script { line, offset } => {
                let error = Error::compilation(OPEN_SCRIPT).with_help("close it with `}%`");
                return Err(self.locate(error, line, Some(Region::new(offset - 2..offset))));
            }
            CursorState::Inside {
                marker,
                line,
                offset,
            } => {
                let error = error_open_declaration(marker.sigil());
                let width = marker.sigil().len() + 1;
                return Err(self.locate(error, line, Some(Region::new(offset..offset + width))));
            }
        }

        let text = self.collect(start, None);
        if text.is_empty() {
            return Ok(None);
        }

        Ok(Some(Step::Fragment(Fragment::Text {
            text,
            line: start.0,
        })))
    }

    /// Turn the text of a tag, expression, message or action into a [`Step`].
    ///
    /// The text still begins with its opening delimiter.
    fn classify(&self, marker: Marker, text: &str, line: usize) -> Result<Step, Error> {
        let mut body = NEWLINES
            .replace_all(text.get(2..).unwrap_or(""), " ")
            .into_owned();

        let step = match marker {
            Marker::Tag => {
                let closing = body.starts_with('/');
                if closing {
                    body.remove(0);
                }
                let has_body = !body.ends_with('/');
                if !has_body {
                    body.pop();
                }

                let trimmed = body.trim_start();
                let (name, args) = match trimmed.split_once(char::is_whitespace) {
                    Some((name, args)) => (name, args.trim_start()),
                    None => (trimmed, ""),
                };
                if name.is_empty() {
                    return Err(self.locate(Error::compilation(NAMELESS_CLOSE), line, None));
                }

                if closing {
                    Step::Close {
                        name: name.to_string(),
                        line,
                    }
                } else {
                    Step::Open {
                        name: name.to_string(),
                        args: args.to_string(),
                        line,
                        has_body,
                    }
                }
            }
            Marker::Expression => Step::Fragment(Fragment::Expression { code: body, line }),
            Marker::Message => Step::Fragment(Fragment::Message { code: body, line }),
            Marker::Action => Step::Fragment(Fragment::Action {
                action: body,
                absolute: false,
                line,
            }),
            Marker::AbsoluteAction => Step::Fragment(Fragment::Action {
                action: body.get(1..).unwrap_or("").to_string(),
                absolute: true,
                line,
            }),
            Marker::Comment | Marker::Script => {
                unreachable!("comments and scripts are never classified")
            }
        };

        Ok(step)
    }

    /// Find the `}` closing the current tag or expression on the given line.
    ///
    /// Braces inside string literals are ignored, and nested braces must be
    /// balanced before the closing one is accepted.
    fn find_end_bracket(&mut self, text: &str, line: usize) -> Result<Option<usize>, Error> {
        let bytes = text.as_bytes();
        let mut index = self.offset;

        while index < bytes.len() {
            match bytes[index] {
                b'}' if self.depth == 0 => return Ok(Some(index)),
                b'}' => self.depth -= 1,
                b'{' => self.depth += 1,
                quote @ (b'\'' | b'"') => {
                    let open = index;
                    index += 1;
                    loop {
                        let found = bytes
                            .get(index..)
                            .and_then(|rest| rest.iter().position(|b| *b == quote));
                        let Some(found) = found else {
                            let error = Error::compilation(UNCLOSED_STRING);
                            let region = Region::new(open..bytes.len());
                            return Err(self
                                .locate(error, line, None)
                                .with_pointer(text, self.line, region));
                        };
                        index += found;
                        if bytes[index - 1] != b'\\' {
                            break;
                        }
                        index += 1;
                    }
                }
                _ => {}
            }
            index += 1;
        }

        Ok(None)
    }

    /// Collect the text from `from` up to `end` on the current line, joining
    /// lines with `\n`.
    ///
    /// With `end` set to `None`, everything up to the end of source is collected.
    /// A trailing `\r` is removed.
    fn collect(&mut self, from: (usize, usize), end: Option<usize>) -> String {
        let (from_line, from_offset) = from;
        let mut text = String::new();

        for index in from_line..=self.line {
            let Some(line) = self.lines.get(index).copied() else {
                break;
            };

            if index == from_line {
                if index == self.line {
                    let end = end.unwrap_or(line.len());
                    text.push_str(line.get(from_offset..end).unwrap_or(""));
                    break;
                }
                text.push_str(line.get(from_offset..).unwrap_or(""));
            } else if index < self.line {
                text.push('\n');
                text.push_str(line);
            } else {
                text.push('\n');
                match end {
                    Some(end) => text.push_str(line.get(..end).unwrap_or("")),
                    None => text.push_str(line),
                }
            }
        }

        if let Some(end) = end {
            self.offset = end;
        }
        if text.ends_with('\r') {
            text.pop();
        }

        text
    }

    /// Move the cursor to the beginning of the following line.
    fn next_line(&mut self) {
        self.line += 1;
        self.offset = 0;
    }

    /// Attach the template name, line and a [`Pointer`][`crate::log::Pointer`] to the given [`Error`].
    fn locate(&self, error: Error, line: usize, region: Option<Region>) -> Error {
        let error = error.with_name(self.name).with_line(line + 1);

        match (self.lines.get(line), region) {
            (Some(text), Some(region)) => error.with_pointer(text, line, region),
            (Some(text), None) => error.with_pointer(text, line, Region::new(0..text.len())),
            _ => error,
        }
    }
}

/// Return the name of the tag that opened a chain of branches.
fn opener<'a>(branches: &'a [Fragment], current: &'a Tag) -> &'a str {
    match branches.first() {
        Some(Fragment::Tag(tag)) => &tag.name,
        _ => &current.name,
    }
}

/// Return the byte offset of `needle` in `text`, searching from `offset`.
fn find_from(text: &str, offset: usize, needle: &str) -> Option<usize> {
    text.get(offset..)?.find(needle).map(|index| index + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Result<Vec<Fragment>, Error> {
        Scanner::new(source, "test.html").scan()
    }

    fn text(text: &str, line: usize) -> Fragment {
        Fragment::Text {
            text: text.to_string(),
            line,
        }
    }

    #[test]
    fn test_scan_text_and_expression() -> Result<(), Error> {
        let fragments = scan("Hello ${name}!")?;

        assert_eq!(
            fragments,
            vec![
                text("Hello ", 0),
                Fragment::Expression {
                    code: "name".to_string(),
                    line: 0
                },
                text("!", 0),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_scan_multiline_text_drops_trailing_newline() -> Result<(), Error> {
        let fragments = scan("a\r\nb\n\n")?;

        assert_eq!(fragments, vec![text("a\r\nb", 0)]);

        Ok(())
    }

    #[test]
    fn test_scan_comment_is_discarded() -> Result<(), Error> {
        let fragments = scan("a*{ one\ntwo }*b")?;

        assert_eq!(fragments, vec![text("a", 0), text("b", 1)]);

        Ok(())
    }

    #[test]
    fn test_scan_script_keeps_newlines() -> Result<(), Error> {
        let fragments = scan("%{ a = 1\n b = 2 }%x")?;

        assert_eq!(
            fragments,
            vec![
                Fragment::Script {
                    code: " a = 1\n b = 2 ".to_string(),
                    line: 0
                },
                text("x", 1),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_scan_tag_with_body() -> Result<(), Error> {
        let fragments = scan("#{if a}\nyes#{/if}")?;

        assert_eq!(
            fragments,
            vec![Fragment::Tag(Tag {
                name: "if".to_string(),
                args: "a".to_string(),
                body: vec![text("\nyes", 0)],
                line: 0,
            })]
        );

        Ok(())
    }

    #[test]
    fn test_scan_inline_else_chain() -> Result<(), Error> {
        let fragments = scan("#{if a}A#{elseif b}B#{else}C#{/if}")?;
        let names: Vec<(&str, &str)> = fragments
            .iter()
            .filter_map(|fragment| match fragment {
                Fragment::Tag(tag) => Some((tag.name.as_str(), tag.args.as_str())),
                _ => None,
            })
            .collect();

        assert_eq!(names, vec![("if", "a"), ("elseif", "b"), ("else", "")]);
        assert!(matches!(&fragments[2], Fragment::Tag(tag) if tag.body == vec![text("C", 0)]));

        Ok(())
    }

    #[test]
    fn test_scan_closed_else_stays_nested() -> Result<(), Error> {
        let fragments = scan("#{if a}#{if b}x#{/if}#{else}y#{/else}#{/if}")?;

        assert!(matches!(&fragments[..], [Fragment::Tag(tag)] if tag.body.len() == 2));

        Ok(())
    }

    #[test]
    fn test_scan_deep_else_chain_is_linear() -> Result<(), Error> {
        let depth = 200;
        let source = format!("{}z{}", "#{if false}a#{else}".repeat(depth), "#{/if}".repeat(depth));

        let start = std::time::Instant::now();
        let fragments = scan(&source)?;

        assert!(start.elapsed() < std::time::Duration::from_secs(2));
        assert!(matches!(&fragments[..], [Fragment::Tag(first), Fragment::Tag(second)]
            if first.name == "if" && second.name == "else"));

        Ok(())
    }

    #[test]
    fn test_scan_error_inside_else_branch_surfaces() {
        let result = scan("#{if a}A#{else}\nB *{ never closed\n#{/if}");

        assert!(result.is_err_and(|e| e.reason() == OPEN_COMMENT));
    }

    #[test]
    fn test_scan_nested_chain_inside_else() -> Result<(), Error> {
        let fragments = scan("#{if a}A#{else}#{if b}B#{else}C#{/if}D#{/if}")?;

        assert!(matches!(&fragments[..], [Fragment::Tag(first), Fragment::Tag(second)]
            if first.name == "if" && second.name == "else" && second.body.len() == 3));

        Ok(())
    }

    #[test]
    fn test_scan_self_closing_tag_and_nested_braces() -> Result<(), Error> {
        let fragments = scan("#{set map: [a: { -> 1 }] /}")?;

        assert_eq!(
            fragments,
            vec![Fragment::Tag(Tag {
                name: "set".to_string(),
                args: "map: [a: { -> 1 }] ".to_string(),
                body: vec![],
                line: 0,
            })]
        );

        Ok(())
    }

    #[test]
    fn test_scan_braces_inside_strings() -> Result<(), Error> {
        for (source, args) in [
            ("a#{simpleTag '}'/}b", "'}'"),
            ("a#{simpleTag '\\'}'/}b", "'\\'}'"),
            ("a#{simpleTag '/}'/}b", "'/}'"),
            ("a#{simpleTag \"#{\"/}b", "\"#{\""),
        ] {
            let fragments = scan(source)?;
            match &fragments[1] {
                Fragment::Tag(tag) => assert_eq!(tag.args, args),
                other => panic!("expected a tag, found {other:?}"),
            }
        }

        Ok(())
    }

    #[test]
    fn test_scan_actions_and_messages() -> Result<(), Error> {
        let fragments = scan("@{Users.show()}@@{Users.list()}&{'hello', name}")?;

        assert_eq!(
            fragments,
            vec![
                Fragment::Action {
                    action: "Users.show()".to_string(),
                    absolute: false,
                    line: 0
                },
                Fragment::Action {
                    action: "Users.list()".to_string(),
                    absolute: true,
                    line: 0
                },
                Fragment::Message {
                    code: "'hello', name".to_string(),
                    line: 0
                },
            ]
        );

        Ok(())
    }

    #[test]
    fn test_scan_multiline_expression_is_joined() -> Result<(), Error> {
        let fragments = scan("${a +\nb}")?;

        assert_eq!(
            fragments,
            vec![Fragment::Expression {
                code: "a + b".to_string(),
                line: 0
            }]
        );

        Ok(())
    }

    #[test]
    fn test_scan_errors() {
        let reason = |source: &str| scan(source).unwrap_err().reason().to_string();

        assert_eq!(reason("a\n*{ x"), OPEN_COMMENT);
        assert_eq!(reason("%{ x"), OPEN_SCRIPT);
        assert_eq!(reason("${ x"), "Found open $-declaration");
        assert_eq!(reason("#{a 'x}"), UNCLOSED_STRING);
        assert_eq!(reason("#{if a}x"), "Found unclosed tag #{if}");
        assert_eq!(reason("#{if a}x#{/list}"), "Found unclosed tag #{if}");
        assert_eq!(reason("x#{/if}"), "#{/if} is not opened.");
        assert_eq!(reason("#{/}"), NAMELESS_CLOSE);
    }

    #[test]
    fn test_scan_error_line() {
        let error = scan("a\nb\n#{if x}").unwrap_err();

        assert_eq!(error.line(), Some(3));
        assert_eq!(error.get_name(), Some("test.html"));
    }
}
