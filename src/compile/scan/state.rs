/// Opening delimiters recognized by the [`Scanner`][`super::Scanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// `#{`
    Tag,
    /// `${`
    Expression,
    /// `&{`
    Message,
    /// `@{`
    Action,
    /// `@@{`
    AbsoluteAction,
    /// `*{`
    Comment,
    /// `%{`
    Script,
}

impl Marker {
    /// Return the [`Marker`] for the given delimiter text.
    pub(crate) fn from_text(text: &str) -> Option<Self> {
        match text {
            "#{" => Some(Self::Tag),
            "${" => Some(Self::Expression),
            "&{" => Some(Self::Message),
            "@{" => Some(Self::Action),
            "@@{" => Some(Self::AbsoluteAction),
            "*{" => Some(Self::Comment),
            "%{" => Some(Self::Script),
            _ => None,
        }
    }

    /// Return the delimiter without its opening brace.
    pub fn sigil(&self) -> &'static str {
        match self {
            Self::Tag => "#",
            Self::Expression => "$",
            Self::Message => "&",
            Self::Action => "@",
            Self::AbsoluteAction => "@@",
            Self::Comment => "*",
            Self::Script => "%",
        }
    }
}

/// Describes the internal state of a [`Scanner`][`super::Scanner`].
///
/// Lines are zero indexed, offsets are byte offsets within that line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorState {
    /// Outside of any delimiter, accumulating plain text.
    Default,
    /// Inside of a comment, only `}*` is recognized.
    Comment { line: usize, offset: usize },
    /// Inside of a script block, only `}%` is recognized.
    Script {
        line: usize,
        /// Offset of the first character after `%{`.
        offset: usize,
    },
    /// Inside of a tag, expression, message or action.
    Inside {
        marker: Marker,
        line: usize,
        /// Offset of the opening delimiter.
        offset: usize,
    },
}
