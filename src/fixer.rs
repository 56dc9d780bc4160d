//! Error attribution.
//!
//! Errors raised while rendering unwind through generated methods, expression
//! methods and engine plumbing, collecting a [`Frame`] at each step. The fixer
//! rewrites that trace into template locations and picks the place the error
//! should be reported at.
use crate::{
    compile::{CompiledTemplate, RENDER_METHOD},
    location::GENERATED_PACKAGE,
    log::{Error, ErrorKind, Frame, FrameKind},
};
use std::sync::Arc;
use tracing::debug;

/// Looks up what the fixer needs to know about the classes in a trace.
pub trait ClassIndex {
    /// Return the compiled template owning the statement or expression class
    /// with the given name.
    fn unit(&self, class: &str) -> Option<Arc<CompiledTemplate>>;

    /// Return true if frames of the class are engine plumbing.
    fn is_plumbing(&self, class: &str) -> bool;

    /// Return true if the class belongs to the host application.
    fn is_application(&self, class: &str) -> bool;
}

/// Where an error was found to come from.
enum Site {
    Template { path: String, line: usize },
    Application { class: String, line: usize },
}

/// Attribute an [`Error`] to a template or application location.
///
/// Compilation errors are returned unchanged. Forwarding errors are replaced
/// by the error they wrap. The trace of the error and of every cause is
/// rewritten, and the kind becomes [`ErrorKind::WithSource`],
/// [`ErrorKind::AppClass`] or [`ErrorKind::Runtime`]. Fixing an error twice
/// gives the same result as fixing it once.
pub fn fix(index: &dyn ClassIndex, mut error: Error) -> Error {
    if error.kind() == ErrorKind::Compilation {
        return error;
    }

    while error.kind() == ErrorKind::Forward {
        let trace = error.take_trace();
        let Some(mut cause) = error.take_cause() else {
            error.set_trace(trace);
            error.set_kind(ErrorKind::General);
            break;
        };
        if cause.trace().is_empty() {
            cause.set_trace(trace);
        }
        error = cause;
    }

    let mut trace = error.take_trace();
    if error.kind() == ErrorKind::TemplateRuntime {
        // Frames in front of the first generated one come from the runtime itself.
        if let Some(start) = trace.iter().position(|frame| frame.kind == FrameKind::Generated) {
            trace.drain(..start);
        }
        if let Some(mut cause) = error.take_cause() {
            if cause.trace().is_empty() {
                cause.set_trace(std::mem::take(&mut trace));
            } else {
                trace = cause.take_trace();
            }
            error = cause;
        }
    }

    let (trace, site) = fix_trace(index, trace);
    error.set_trace(trace);

    match (error.kind(), site) {
        (ErrorKind::WithSource | ErrorKind::AppClass, _) => {}
        (ErrorKind::TemplateNotFound, Some(Site::Template { path, line })) => {
            if error.get_name().is_none() {
                error.set_location(Some(path), None, line);
            }
        }
        (ErrorKind::TemplateNotFound, _) => {}
        (_, Some(Site::Template { path, line })) => {
            debug!(template = path.as_str(), line, "error attributed to template");
            error.set_location(Some(path), None, line);
            error.set_kind(ErrorKind::WithSource);
        }
        (_, Some(Site::Application { class, line })) => {
            debug!(class = class.as_str(), line, "error attributed to application");
            error.set_location(None, Some(class), line);
            error.set_kind(ErrorKind::AppClass);
        }
        (_, None) => error.set_kind(ErrorKind::Runtime),
    }

    let mut cause = error.cause_mut();
    while let Some(inner) = cause {
        let trace = inner.take_trace();
        inner.set_trace(fix_trace(index, trace).0);
        cause = inner.cause_mut();
    }

    error
}

/// Rewrite the frames of a trace, returning the frames that remain and the
/// first location found.
fn fix_trace(index: &dyn ClassIndex, trace: Vec<Frame>) -> (Vec<Frame>, Option<Site>) {
    let mut fixed = Vec::with_capacity(trace.len());
    let mut site = None;
    let mut previous: Option<String> = None;

    for frame in trace {
        match frame.kind {
            FrameKind::Generated if frame.class.starts_with(GENERATED_PACKAGE) => {
                let Some(unit) = index.unit(&frame.class) else {
                    fixed.push(frame);
                    continue;
                };
                // The root method only locates an error nothing else could.
                if frame.method == RENDER_METHOD && site.is_some() {
                    continue;
                }
                let path = unit.location().relative_path();
                if previous.as_deref() == Some(path) || frame.line == 0 {
                    continue;
                }

                let line = if unit.expressions().class() == frame.class {
                    unit.expressions().line_map().translate(frame.line)
                } else {
                    unit.statements().line_map().translate(frame.line)
                };
                previous = Some(path.to_string());
                if site.is_none() {
                    site = Some(Site::Template {
                        path: path.to_string(),
                        line,
                    });
                }
                fixed.push(Frame::template(path, line));
            }
            FrameKind::Template => {
                if previous.as_deref() == Some(frame.class.as_str()) {
                    continue;
                }
                previous = Some(frame.class.clone());
                if site.is_none() {
                    site = Some(Site::Template {
                        path: frame.class.clone(),
                        line: frame.line,
                    });
                }
                fixed.push(frame);
            }
            _ if index.is_plumbing(&frame.class) => {}
            FrameKind::Application if frame.line > 0 && index.is_application(&frame.class) => {
                if site.is_none() {
                    site = Some(Site::Application {
                        class: frame.class.clone(),
                        line: frame.line,
                    });
                }
                fixed.push(frame);
            }
            _ => fixed.push(frame),
        }
    }

    (fixed, site)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compile::{assemble, Generator, TagLookup},
        location::TemplateLocation,
        tags::{legacy::LegacyTag, FastTag},
    };
    use std::collections::HashMap;

    struct Lookup;

    impl TagLookup for Lookup {
        fn fast_tag(&self, name: &str) -> Option<Arc<dyn FastTag>> {
            crate::tags::fast::resolve(name)
        }

        fn legacy_tag(&self, _: &str) -> Option<Arc<dyn LegacyTag>> {
            None
        }

        fn template_exists(&self, _: &str) -> bool {
            false
        }
    }

    struct Index {
        units: HashMap<String, Arc<CompiledTemplate>>,
    }

    impl Index {
        fn new(path: &str, source: &str) -> Result<(Self, Arc<CompiledTemplate>), Error> {
            let location = TemplateLocation::embedded_at(path, source);
            let generated = Generator::new(&location, &Lookup)?.generate(source)?;
            let unit = Arc::new(assemble(location, &generated, &Lookup)?);

            let mut units = HashMap::new();
            units.insert(unit.class().to_string(), Arc::clone(&unit));
            units.insert(unit.expressions().class().to_string(), Arc::clone(&unit));

            Ok((Self { units }, unit))
        }
    }

    impl ClassIndex for Index {
        fn unit(&self, class: &str) -> Option<Arc<CompiledTemplate>> {
            self.units.get(class).cloned()
        }

        fn is_plumbing(&self, class: &str) -> bool {
            class.starts_with("fastergt.expr.")
        }

        fn is_application(&self, class: &str) -> bool {
            class.starts_with("app.")
        }
    }

    /// Return the artifact line of the first instruction of a method.
    fn instruction_line(unit: &CompiledTemplate, method: &str) -> usize {
        unit.statements()
            .method(method)
            .and_then(|method| method.instructions().first())
            .map_or(0, |instruction| instruction.line)
    }

    #[test]
    fn test_expression_frame_is_attributed() -> Result<(), Error> {
        let (index, unit) = Index::new("views/a.html", "a\nb\n${user.name}")?;
        let expression = unit
            .expressions()
            .method("expression_0")
            .map_or(0, |method| method.line + 1);

        let error = Error::build("Cannot get property 'name' on null object")
            .with_frame(Frame::generated(unit.expressions().class(), "expression_0", expression))
            .with_frame(Frame::generated(unit.class(), RENDER_METHOD, instruction_line(&unit, RENDER_METHOD)));
        let fixed = fix(&index, error);

        assert_eq!(fixed.kind(), ErrorKind::WithSource);
        assert_eq!(fixed.get_name(), Some("views/a.html"));
        assert_eq!(fixed.line(), Some(3));
        assert_eq!(fixed.trace(), &[Frame::template("views/a.html", 3)]);
        assert_eq!(fixed.reason(), "Cannot get property 'name' on null object");

        Ok(())
    }

    #[test]
    fn test_application_frame_comes_first() -> Result<(), Error> {
        let (index, unit) = Index::new("views/b.html", "x\n#{get 'a' /}")?;
        let tag = unit
            .statements()
            .methods
            .keys()
            .find(|name| name.starts_with("m_get"))
            .cloned()
            .unwrap_or_default();

        let error = Error::build("database down")
            .with_frame(Frame::application("app.Users", "find", 12))
            .with_frame(Frame::engine("fastergt.expr.Extensions", "find"))
            .with_frame(Frame::generated(unit.class(), tag.as_str(), instruction_line(&unit, &tag)));
        let fixed = fix(&index, error);

        assert_eq!(fixed.kind(), ErrorKind::AppClass);
        assert_eq!(fixed.class(), Some("app.Users"));
        assert_eq!(fixed.line(), Some(12));
        assert_eq!(fixed.trace().len(), 2);

        Ok(())
    }

    #[test]
    fn test_template_runtime_skips_leading_frames() -> Result<(), Error> {
        let (index, unit) = Index::new("views/c.html", "#{doLayout /}")?;
        let tag = unit
            .statements()
            .methods
            .keys()
            .find(|name| name.starts_with("m_doLayout"))
            .cloned()
            .unwrap_or_default();

        let error = Error::template_runtime("No template is currently extending this template")
            .with_frame(Frame::application("app.Filter", "wrap", 3))
            .with_frame(Frame::generated(unit.class(), tag.as_str(), instruction_line(&unit, &tag)));
        let fixed = fix(&index, error);

        assert_eq!(fixed.kind(), ErrorKind::WithSource);
        assert_eq!(fixed.line(), Some(1));

        Ok(())
    }

    #[test]
    fn test_forward_and_idempotence() -> Result<(), Error> {
        let (index, unit) = Index::new("views/d.html", "\n${x}")?;
        let expression = unit
            .expressions()
            .method("expression_0")
            .map_or(0, |method| method.line + 1);

        let error = Error::forward(Error::build("boom"))
            .with_frame(Frame::generated(unit.expressions().class(), "expression_0", expression));
        let once = fix(&index, error);
        let line = once.line();
        let twice = fix(&index, once);

        assert_eq!(twice.kind(), ErrorKind::WithSource);
        assert_eq!(twice.reason(), "boom");
        assert_eq!(line, Some(2));
        assert_eq!(twice.line(), Some(2));
        assert_eq!(twice.trace().len(), 1);

        Ok(())
    }

    #[test]
    fn test_unattributed() {
        let index = Index {
            units: HashMap::new(),
        };
        let fixed = fix(&index, Error::build("nothing known").with_frame(Frame::engine("fastergt.expr.Eval", "call")));

        assert_eq!(fixed.kind(), ErrorKind::Runtime);
        assert!(fixed.trace().is_empty());
    }

    #[test]
    fn test_compilation_is_untouched() {
        let index = Index {
            units: HashMap::new(),
        };
        let error = Error::compilation("Found unclosed tag #{if}").with_frame(Frame::engine("fastergt.expr.X", "y"));
        let fixed = fix(&index, error);

        assert_eq!(fixed.kind(), ErrorKind::Compilation);
        assert_eq!(fixed.trace().len(), 1);
    }
}
