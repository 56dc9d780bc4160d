/// A semantic piece of a template, tagged with the 0-based line it starts on.
///
/// Fragments are produced in source order. The body of a tag is itself a
/// fragment list.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Text written to the output as-is.
    Text { text: String, line: usize },
    /// `${code}`, evaluated and printed with escaping.
    Expression { code: String, line: usize },
    /// `&{key, args}`, resolved through the message resolver.
    Message { code: String, line: usize },
    /// `@{action}` or `@@{action}`, rendered by the host action renderer.
    Action {
        action: String,
        absolute: bool,
        line: usize,
    },
    /// `%{code}%`, executed for its side effects.
    Script { code: String, line: usize },
    /// `#{name args}body#{/name}` or `#{name args/}`.
    Tag(Tag),
}

/// An opened tag, with the fragments found before its close tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    /// Unparsed argument text, or an empty string.
    pub args: String,
    pub body: Vec<Fragment>,
    pub line: usize,
}

impl Fragment {
    /// Return the 0-based line the [`Fragment`] starts on.
    pub fn line(&self) -> usize {
        match self {
            Fragment::Text { line, .. }
            | Fragment::Expression { line, .. }
            | Fragment::Message { line, .. }
            | Fragment::Action { line, .. }
            | Fragment::Script { line, .. } => *line,
            Fragment::Tag(tag) => tag.line,
        }
    }
}
