use super::{Pointer, RED, RESET};
use crate::{log::Visual, region::Region};
use std::fmt::{Debug, Display, Formatter, Result};

/// Category of an [`Error`].
///
/// The first four kinds are raised by the engine while compiling or rendering.
/// The last three are produced by the exception fixer once an error has been
/// attributed to a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed template markup, or a tag with no implementation.
    ///
    /// Always carries the template name and line, and is never rewritten by the fixer.
    Compilation,
    /// A template, tag-file or extended template that cannot be located.
    TemplateNotFound,
    /// Invalid usage detected by the runtime, such as `#{doLayout}` without an extending template.
    TemplateRuntime,
    /// Wraps another [`Error`] without adding information of its own.
    Forward,
    /// Any other error, usually raised by evaluation or by a host collaborator.
    General,
    /// Attributed to a template and a line in that template.
    WithSource,
    /// Attributed to a class of the host application.
    AppClass,
    /// Passed through the fixer without finding a location.
    Runtime,
}

/// Origin of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A method of a generated template class.
    Generated,
    /// A generated frame that was already rewritten to a template location.
    Template,
    /// Engine code, including expression evaluation plumbing.
    Engine,
    /// Code belonging to the host application.
    Application,
}

/// One entry in the trace of an [`Error`], innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Class name, or the relative template path for [`FrameKind::Template`].
    pub class: String,
    pub method: String,
    /// Line number, where 0 means unknown.
    pub line: usize,
}

impl Frame {
    /// Create a frame for a method of a generated template class.
    ///
    /// The line is a line of the generated artifact, not of the template.
    pub fn generated<C, M>(class: C, method: M, line: usize) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            kind: FrameKind::Generated,
            class: class.into(),
            method: method.into(),
            line,
        }
    }

    /// Create a frame pointing at a line of a template.
    pub fn template<P>(path: P, line: usize) -> Self
    where
        P: Into<String>,
    {
        Self {
            kind: FrameKind::Template,
            class: path.into(),
            method: String::new(),
            line,
        }
    }

    /// Create a frame for engine code.
    pub fn engine<C, M>(class: C, method: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            kind: FrameKind::Engine,
            class: class.into(),
            method: method.into(),
            line: 0,
        }
    }

    /// Create a frame for code belonging to the host application.
    pub fn application<C, M>(class: C, method: M, line: usize) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            kind: FrameKind::Application,
            class: class.into(),
            method: method.into(),
            line,
        }
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.kind {
            FrameKind::Template => write!(f, "at {}({})", self.class, self.line),
            _ if self.line == 0 => write!(f, "at {}.{}", self.class, self.method),
            _ => write!(f, "at {}.{}({})", self.class, self.method, self.line),
        }
    }
}

/// Describes an error, and allows adding a contextual help text and visualization.
///
/// # Examples
///
/// Creating an [`Error`] that includes a [`Visual`] of type [`Pointer`]:
///
/// ```
/// use fastergt::{Error, ErrorKind, Region};
///
/// let error = Error::compilation("Found unclosed tag #{list}")
///     .with_pointer("#{list items}", 0, Region::new(0..13))
///     .with_name("views/index.html")
///     .with_line(1)
///     .with_help("close it with #{/list}");
///
/// assert_eq!(error.kind(), ErrorKind::Compilation);
/// ```
///
/// When printed with `println!("{:#}", error)` the [`Error`] produces this output:
///
/// ```text
/// error: Found unclosed tag #{list}
///   --> views/index.html:1:1
///    |
///  1 | #{list items}
///    | ^^^^^^^^^^^^^
///    |
///   = help: close it with #{/list}
/// ```
pub struct Error {
    /// Category of the [`Error`].
    kind: ErrorKind,
    /// Describes the cause of the [`Error`].
    reason: String,
    /// A visualization to help illustrate the [`Error`].
    visual: Option<Box<dyn Visual>>,
    /// Additional information to display with the [`Error`].
    help: Option<String>,
    /// The relative path of the template that the [`Error`] comes from.
    name: Option<String>,
    /// The 1-based template line, or application class line.
    line: Option<usize>,
    /// The application class the [`Error`] was attributed to.
    class: Option<String>,
    /// Frames collected while the [`Error`] unwound, innermost first.
    trace: Vec<Frame>,
    /// The wrapped [`Error`], if any.
    cause: Option<Box<Error>>,
}

impl Error {
    /// Create a new [`Error`] of the given kind.
    pub fn new<T>(kind: ErrorKind, reason: T) -> Self
    where
        T: Into<String>,
    {
        Error {
            kind,
            reason: reason.into(),
            visual: None,
            help: None,
            name: None,
            line: None,
            class: None,
            trace: vec![],
            cause: None,
        }
    }

    /// Create a new [`ErrorKind::General`] [`Error`] with the given reason text.
    ///
    /// The additional fields may be populated using the various methods
    /// defined on `Error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fastergt::Error;
    ///
    /// Error::build("unexpected token")
    ///     .with_help("expected `)`, found `]`");
    /// ```
    pub fn build<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Error::new(ErrorKind::General, reason)
    }

    /// Create a new [`ErrorKind::Compilation`] [`Error`].
    pub fn compilation<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Error::new(ErrorKind::Compilation, reason)
    }

    /// Create a new [`ErrorKind::TemplateNotFound`] [`Error`].
    pub fn not_found<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Error::new(ErrorKind::TemplateNotFound, reason)
    }

    /// Create a new [`ErrorKind::TemplateRuntime`] [`Error`].
    pub fn template_runtime<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Error::new(ErrorKind::TemplateRuntime, reason)
    }

    /// Wrap the given [`Error`] in an [`ErrorKind::Forward`] `Error`.
    pub fn forward(cause: Error) -> Self {
        let reason = cause.reason.clone();

        Error::new(ErrorKind::Forward, reason).with_cause(cause)
    }

    /// Set the reason text, which is a short summary of the [`Error`].
    pub fn with_reason<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.reason = text.into();

        self
    }

    /// Set the [`ErrorKind`].
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;

        self
    }

    /// Set the name text, which is the relative path of the template that the
    /// [`Error`] is related to.
    pub fn with_name<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.name = Some(text.into());

        self
    }

    /// Set the 1-based line the [`Error`] is attributed to.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);

        self
    }

    /// Set the application class the [`Error`] is attributed to.
    pub fn with_class<T>(mut self, class: T) -> Self
    where
        T: Into<String>,
    {
        self.class = Some(class.into());

        self
    }

    /// Set the [`Visual`], which is a visualization that helps illustrate the
    /// cause of the error.
    pub fn with_visual(mut self, visual: impl Visual + 'static) -> Self {
        self.visual = Some(Box::new(visual));

        self
    }

    /// Set the visualization to a new [`Pointer`] over the given line of text.
    ///
    /// The line number is zero indexed, and the [`Region`] is relative to the
    /// beginning of the line.
    pub fn with_pointer<T>(mut self, text: &str, line: usize, region: T) -> Self
    where
        T: Into<Region>,
    {
        self.visual = Some(Box::new(Pointer::new(text, line, region.into())));

        self
    }

    /// Set the help text, which is contextual information to accompany the
    /// reason text.
    pub fn with_help<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.help = Some(text.into());

        self
    }

    /// Push a [`Frame`] onto the trace.
    ///
    /// Frames are pushed while the error unwinds, so the first frame is the innermost.
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.trace.push(frame);

        self
    }

    /// Set the wrapped [`Error`].
    pub fn with_cause(mut self, cause: Error) -> Self {
        self.cause = Some(Box::new(cause));

        self
    }

    /// Return the [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return the reason text.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Return the help text.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Return the relative path of the template that the error is related to.
    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the 1-based line the error is attributed to.
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// Return the application class the error is attributed to.
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    /// Return the frames collected while the error unwound, innermost first.
    pub fn trace(&self) -> &[Frame] {
        &self.trace
    }

    /// Return the wrapped error.
    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_deref()
    }

    pub(crate) fn set_trace(&mut self, trace: Vec<Frame>) {
        self.trace = trace;
    }

    pub(crate) fn take_trace(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.trace)
    }

    pub(crate) fn take_cause(&mut self) -> Option<Error> {
        self.cause.take().map(|cause| *cause)
    }

    pub(crate) fn cause_mut(&mut self) -> Option<&mut Error> {
        self.cause.as_deref_mut()
    }

    pub(crate) fn set_kind(&mut self, kind: ErrorKind) {
        self.kind = kind;
    }

    pub(crate) fn set_location(&mut self, name: Option<String>, class: Option<String>, line: usize) {
        self.name = name;
        self.class = class;
        self.line = Some(line);
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if !f.alternate() {
            writeln!(f, "{self:#}")?;
        }
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("reason", &self.reason)
            .field("name", &self.name)
            .field("line", &self.line)
            .field("class", &self.class)
            .field("visual", &self.visual)
            .field("help", &self.help)
            .field("trace", &self.trace)
            .field("cause", &self.cause)
            .finish()?;

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let header = format!("{RED}error{RESET}");
        write!(f, "{header}: {}", self.reason)?;

        if !f.alternate() {
            return Ok(());
        }
        if let Some(visual) = self.visual.as_ref() {
            return visual.display(f, self.name.as_deref(), self.help.as_deref());
        }

        match (self.name.as_deref(), self.class.as_deref(), self.line) {
            (Some(name), _, Some(line)) => write!(f, "\n  --> {name}:{line}")?,
            (None, Some(class), Some(line)) => write!(f, "\n  --> {class}:{line}")?,
            _ => {}
        }
        if let Some(help) = self.help.as_deref() {
            write!(f, "\n   = help: {help}")?;
        }
        for frame in self.trace.iter() {
            write!(f, "\n    {frame}")?;
        }

        Ok(())
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason && self.help == other.help && self.name == other.name
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::build(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::build(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_location() {
        let error = Error::template_runtime("boom")
            .with_name("views/a.html")
            .with_line(4);

        assert_eq!(error.kind(), ErrorKind::TemplateRuntime);
        assert_eq!(error.get_name(), Some("views/a.html"));
        assert_eq!(error.line(), Some(4));
        assert_eq!(error.to_string(), format!("{RED}error{RESET}: boom"));
    }

    #[test]
    fn test_frames_are_pushed_innermost_first() {
        let error = Error::build("boom")
            .with_frame(Frame::generated("a", "inner", 3))
            .with_frame(Frame::generated("a", "outer", 9));

        assert_eq!(error.trace()[0].method, "inner");
        assert_eq!(error.trace()[1].method, "outer");
    }

    #[test]
    fn test_forward_keeps_cause() {
        let error = Error::forward(Error::build("inner"));

        assert_eq!(error.kind(), ErrorKind::Forward);
        assert_eq!(error.reason(), "inner");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_alternate_display_includes_location() {
        let error = Error::build("boom").with_name("views/a.html").with_line(2);
        let text = format!("{error:#}");

        assert!(text.contains("--> views/a.html:2"));
    }
}
