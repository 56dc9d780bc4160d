//! Code generation.
//!
//! Walks the fragment tree of a template and writes two textual artifacts:
//!
//! - The statement artifact holds control flow. It is a list of methods, each a
//!   list of instructions that print text, call other methods and dispatch tags.
//! - The expression artifact holds every expression, tag argument list and
//!   script block, each as its own method.
//!
//! Every line that originates from template source ends with a `//lineNo:N`
//! sentinel, which is read back into a [`LineMap`][`super::LineMap`].
use super::{
    line_map::SENTINEL,
    scan::{Fragment, Scanner, Tag},
    TagLookup,
};
use crate::{
    location::{fix_for_code, TemplateLocation, EXPRESSION_SUFFIX, GENERATED_PACKAGE},
    log::{error_missing_tag, Error},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Write};
use tracing::debug;

/// Name of the method that renders the root of a template.
pub const RENDER_METHOD: &str = "_renderTemplate";

/// Tag arguments that already name their first value.
static NAMED_ARGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[_a-zA-Z0-9]+\s*:.*$").expect("named argument pattern is valid"));

static NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n").expect("newline pattern is valid"));

/// The artifacts generated for one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated {
    /// Fully qualified class name of the statement artifact.
    pub class: String,
    pub statements: String,
    pub expressions: String,
}

/// A text artifact under construction.
#[derive(Default)]
struct Artifact {
    text: String,
}

impl Artifact {
    /// Write a line that has no counterpart in the template.
    fn scaffold<T>(&mut self, line: T)
    where
        T: AsRef<str>,
    {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    /// Write a line that originates from the given 1-based template line.
    fn mapped<T>(&mut self, line: T, source_line: usize)
    where
        T: AsRef<str>,
    {
        // Writing to a String cannot fail.
        let _ = writeln!(self.text, "{} {SENTINEL}{source_line}", line.as_ref());
    }
}

/// Generates the artifacts of a template.
pub struct Generator<'a> {
    location: &'a TemplateLocation,
    lookup: &'a dyn TagLookup,
    class: String,
    statements: Artifact,
    expressions: Artifact,
    /// Shared by every generated method name.
    next_method_index: usize,
    /// Expression text to method name.
    expression_methods: HashMap<String, String>,
    /// Trimmed tag argument text to method name.
    args_methods: HashMap<String, String>,
}

impl<'a> Generator<'a> {
    /// Create a new [`Generator`] for the template at the given location.
    ///
    /// Tags that are not compiled internally are resolved through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if no class name can be derived from the location.
    pub fn new(location: &'a TemplateLocation, lookup: &'a dyn TagLookup) -> Result<Self, Error> {
        Ok(Self {
            location,
            lookup,
            class: location.class_name()?,
            statements: Artifact::default(),
            expressions: Artifact::default(),
            next_method_index: 0,
            expression_methods: HashMap::new(),
            args_methods: HashMap::new(),
        })
    }

    /// Scan the source and generate both artifacts.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the source cannot be scanned, a tag name cannot
    /// be used in a method name, or a tag has no implementation.
    pub fn generate(mut self, source: &str) -> Result<Generated, Error> {
        let fragments = Scanner::new(source, self.location.relative_path()).scan()?;

        self.statements.scaffold(format!("template {}", self.class));
        self.statements
            .scaffold(format!("location {}", quote(self.location.relative_path())));
        self.statements
            .scaffold(format!("expressions {}{EXPRESSION_SUFFIX}", self.class));
        self.statements.scaffold("");

        let simple = self
            .class
            .rsplit('.')
            .next()
            .unwrap_or(self.class.as_str())
            .to_string();
        self.expressions.scaffold(format!("package {GENERATED_PACKAGE}"));
        self.expressions
            .scaffold(format!("class {simple}{EXPRESSION_SUFFIX}"));

        self.generate_method(&fragments, RENDER_METHOD)?;

        Ok(Generated {
            class: self.class,
            statements: self.statements.text,
            expressions: self.expressions.text,
        })
    }

    /// Write a method running the given fragments.
    ///
    /// Methods needed by the fragments are written first, so a method always
    /// follows the methods it calls.
    fn generate_method(&mut self, fragments: &[Fragment], name: &str) -> Result<(), Error> {
        let mut instructions = vec![];

        for fragment in fragments {
            let line = fragment.line() + 1;
            let instruction = match fragment {
                Fragment::Text { text, .. } if text.is_empty() => continue,
                Fragment::Text { text, .. } => format!("text {}", quote(text)),
                Fragment::Expression { code, .. } => {
                    format!("print {}", self.expression_method(code, line))
                }
                Fragment::Message { code, .. } => {
                    format!("message {}", self.expression_method(&format!("[{code}]"), line))
                }
                Fragment::Action {
                    action, absolute, ..
                } => format!("action {absolute} {}", quote(action)),
                Fragment::Script { code, .. } => {
                    format!("script {}", self.script_method(code, line))
                }
                Fragment::Tag(tag) => format!("call {}", self.tag_method(tag)?),
            };
            instructions.push((instruction, line));
        }

        self.statements.scaffold(format!("method {name}"));
        for (instruction, line) in instructions {
            self.statements.mapped(instruction, line);
        }
        self.statements.scaffold("end");
        self.statements.scaffold("");

        Ok(())
    }

    /// Write the method for a tag and return its name.
    ///
    /// The method enters the tag, evaluates its arguments, dispatches to the
    /// implementation and leaves the tag. The body becomes a separate content
    /// method, omitted when the body is empty.
    fn tag_method(&mut self, tag: &Tag) -> Result<String, Error> {
        let line = tag.line + 1;
        let args = self.args_method(tag)?;
        let method = format!("m_{}_{}", self.fix(tag)?, self.next_index());

        let content = if tag.body.is_empty() {
            None
        } else {
            let content = format!("{method}_content");
            self.generate_method(&tag.body, &content)?;
            Some(content)
        };
        let dispatch = self.dispatch(tag, content.as_deref().unwrap_or("-"))?;

        self.statements.scaffold(format!("method {method}"));
        self.statements
            .mapped(format!("enter {}", quote(&tag.name)), line);
        self.statements
            .mapped(format!("args {}", args.as_deref().unwrap_or("-")), line);
        self.statements.mapped(dispatch, line);
        self.statements
            .mapped(format!("leave {}", quote(&tag.name)), line);
        self.statements.scaffold("end");
        self.statements.scaffold("");

        Ok(method)
    }

    /// Return the instruction that runs the implementation of a tag.
    ///
    /// Tags are resolved in this order: tags compiled internally, fast-tags,
    /// legacy fast-tags, a tag-file with the extension of this template and a
    /// tag-file with the `.tag` extension.
    fn dispatch(&self, tag: &Tag, content: &str) -> Result<String, Error> {
        let name = tag.name.as_str();

        if let Some(instruction) = internal_instruction(name) {
            debug!(tag = name, "compiled internally");
            return Ok(format!("{instruction} {content}"));
        }
        if self.lookup.fast_tag(name).is_some() {
            debug!(tag = name, "resolved to a fast-tag");
            return Ok(format!("fasttag {} {content}", quote(name)));
        }
        if self.lookup.legacy_tag(name).is_some() {
            debug!(tag = name, "resolved to a legacy fast-tag");
            return Ok(format!("legacytag {} {content}", quote(name)));
        }

        let path = name.replace('.', "/");
        let mut candidates = vec![];
        if let Some(extension) = self.location.extension() {
            candidates.push(format!("tags/{path}.{extension}"));
        }
        candidates.push(format!("tags/{path}.tag"));

        for candidate in candidates {
            if self.lookup.template_exists(&candidate) {
                debug!(tag = name, path = candidate.as_str(), "resolved to a tag-file");
                return Ok(format!(
                    "tagfile {} {} {content}",
                    quote(name),
                    quote(&candidate)
                ));
            }
        }

        Err(error_missing_tag(name)
            .with_name(self.location.relative_path())
            .with_line(tag.line + 1))
    }

    /// Return the name of the method evaluating an expression, writing it on
    /// first use.
    fn expression_method(&mut self, code: &str, line: usize) -> String {
        if let Some(method) = self.expression_methods.get(code) {
            return method.clone();
        }

        let method = format!("expression_{}", self.next_index());
        self.write_expression(&method, code, line);
        self.expression_methods
            .insert(code.to_string(), method.clone());

        method
    }

    /// Return the name of the method building the argument map of a tag, or
    /// `None` when the tag has no arguments.
    ///
    /// A single unnamed value becomes the `arg` entry.
    fn args_method(&mut self, tag: &Tag) -> Result<Option<String>, Error> {
        let text = tag.args.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if let Some(method) = self.args_methods.get(text) {
            return Ok(Some(method.clone()));
        }

        let code = if NAMED_ARGS.is_match(text) {
            format!("[{text}]")
        } else {
            format!("[arg:{text}]")
        };
        let method = format!("args_{}_{}", self.fix(tag)?, self.next_index());
        self.write_expression(&method, &code, tag.line + 1);
        self.args_methods.insert(text.to_string(), method.clone());

        Ok(Some(method))
    }

    /// Write a script method and return its name.
    ///
    /// Every line of the script keeps its own mapping.
    fn script_method(&mut self, code: &str, line: usize) -> String {
        let method = format!("custom_script_{}", self.next_index());

        self.expressions.scaffold("");
        self.expressions.scaffold("");
        self.expressions
            .mapped(format!("def {method}(out) {{"), line);
        for (offset, text) in NEWLINES.split(code).enumerate() {
            self.expressions.mapped(text, line + offset);
        }
        self.expressions.scaffold("}");

        method
    }

    fn write_expression(&mut self, method: &str, code: &str, line: usize) {
        self.expressions.scaffold("");
        self.expressions.scaffold("");
        self.expressions.mapped(format!("def {method}() {{"), line);
        self.expressions.mapped(format!("  return {code};"), line);
        self.expressions.scaffold("}");
    }

    /// Return the tag name in a form usable in a method name.
    fn fix(&self, tag: &Tag) -> Result<String, Error> {
        fix_for_code(&tag.name).map_err(|e| {
            e.with_name(self.location.relative_path())
                .with_line(tag.line + 1)
        })
    }

    fn next_index(&mut self) -> usize {
        let index = self.next_method_index;
        self.next_method_index += 1;

        index
    }
}

/// Return the instruction for a tag that is compiled internally.
fn internal_instruction(name: &str) -> Option<&'static str> {
    let instruction = match name {
        "if" => "if",
        "ifnot" => "ifnot",
        "else" => "else",
        "elseif" => "elseif",
        "list" => "list",
        "extends" => "extends",
        "doLayout" => "dolayout",
        _ => return None,
    };

    Some(instruction)
}

/// Quote text for use in the statement artifact.
///
/// Backslash, quote, newline and carriage return are escaped, so the result
/// always fits on one line.
pub(crate) fn quote(text: &str) -> String {
    let mut buffer = String::with_capacity(text.len() + 2);
    buffer.push('"');
    for c in text.chars() {
        match c {
            '\\' => buffer.push_str("\\\\"),
            '"' => buffer.push_str("\\\""),
            '\n' => buffer.push_str("\\n"),
            '\r' => buffer.push_str("\\r"),
            c => buffer.push(c),
        }
    }
    buffer.push('"');

    buffer
}

/// Read text written by [`quote`] from the beginning of `text`.
///
/// Returns the unquoted text and the remainder after the closing quote.
pub(crate) fn unquote(text: &str) -> Option<(String, &str)> {
    let rest = text.strip_prefix('"')?;
    let mut buffer = String::new();
    let mut chars = rest.char_indices();

    while let Some((index, c)) = chars.next() {
        match c {
            '"' => return Some((buffer, &rest[index + 1..])),
            '\\' => match chars.next()?.1 {
                'n' => buffer.push('\n'),
                'r' => buffer.push('\r'),
                other => buffer.push(other),
            },
            c => buffer.push(c),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compile::LineMap,
        tags::{legacy::LegacyTag, FastTag},
    };
    use std::sync::Arc;

    /// Knows no tags, and finds the tag-files it was given.
    struct Lookup(Vec<&'static str>);

    impl TagLookup for Lookup {
        fn fast_tag(&self, _: &str) -> Option<Arc<dyn FastTag>> {
            None
        }

        fn legacy_tag(&self, _: &str) -> Option<Arc<dyn LegacyTag>> {
            None
        }

        fn template_exists(&self, relative_path: &str) -> bool {
            self.0.contains(&relative_path)
        }
    }

    fn generate(path: &str, source: &str, tag_files: Vec<&'static str>) -> Result<Generated, Error> {
        let location = TemplateLocation::embedded_at(path, source);
        let lookup = Lookup(tag_files);

        Generator::new(&location, &lookup)?.generate(source)
    }

    #[test]
    fn test_expression_is_delegated() -> Result<(), Error> {
        let generated = generate("views/a.html", "Hello ${name}!", vec![])?;

        assert_eq!(
            generated.class,
            "fastergt.generated_templates.GTTemplate_views_a_html"
        );
        assert!(generated
            .statements
            .contains("method _renderTemplate\ntext \"Hello \" //lineNo:1\nprint expression_0 //lineNo:1\ntext \"!\" //lineNo:1\nend"));
        assert!(generated
            .expressions
            .contains("def expression_0() { //lineNo:1\n  return name; //lineNo:1\n}"));

        Ok(())
    }

    #[test]
    fn test_identical_expressions_share_a_method() -> Result<(), Error> {
        let generated = generate("a.html", "${a}\n${b}\n${a}", vec![])?;

        assert_eq!(generated.expressions.matches("def expression_").count(), 2);
        assert!(generated.statements.contains("print expression_0 //lineNo:3"));

        Ok(())
    }

    #[test]
    fn test_tag_arguments() -> Result<(), Error> {
        let generated = generate(
            "a.html",
            "#{if user}x#{/if}#{list items:users, as:'u'}y#{/list}#{if  user }z#{/if}",
            vec![],
        )?;

        assert!(generated.expressions.contains("  return [arg:user];"));
        assert!(generated
            .expressions
            .contains("  return [items:users, as:'u'];"));
        assert_eq!(generated.expressions.matches("def args_if_").count(), 1);
        assert!(generated.statements.contains("if m_if_1_content //lineNo:1"));

        Ok(())
    }

    #[test]
    fn test_tag_without_arguments_or_body() -> Result<(), Error> {
        let generated = generate("a.html", "#{doLayout /}", vec![])?;

        assert!(generated.statements.contains(
            "method m_doLayout_0\nenter \"doLayout\" //lineNo:1\nargs - //lineNo:1\ndolayout - //lineNo:1\nleave \"doLayout\" //lineNo:1\nend"
        ));

        Ok(())
    }

    #[test]
    fn test_tag_file_resolution() -> Result<(), Error> {
        let generated = generate(
            "views/a.html",
            "#{my.hello /}#{other /}",
            vec!["tags/my/hello.html", "tags/other.tag", "tags/other.html"],
        )?;

        assert!(generated
            .statements
            .contains("tagfile \"my.hello\" \"tags/my/hello.html\" -"));
        assert!(generated
            .statements
            .contains("tagfile \"other\" \"tags/other.html\" -"));

        let generated = generate("views/a.txt", "#{other /}", vec!["tags/other.tag"])?;
        assert!(generated
            .statements
            .contains("tagfile \"other\" \"tags/other.tag\" -"));

        Ok(())
    }

    #[test]
    fn test_missing_tag() {
        let error = generate("a.html", "\n\n#{nothing /}", vec![]).unwrap_err();

        assert_eq!(error.reason(), "Cannot find tag-implementation for 'nothing'");
        assert_eq!(error.line(), Some(3));
        assert_eq!(error.get_name(), Some("a.html"));
    }

    #[test]
    fn test_script_lines_keep_mapping() -> Result<(), Error> {
        let generated = generate("a.html", "x\n%{ a = 1\n b = 2 }%", vec![])?;
        let map = LineMap::from_source(&generated.expressions);
        let lines: Vec<&str> = generated.expressions.lines().collect();
        let second = lines
            .iter()
            .position(|line| line.starts_with(" b = 2"))
            .map(|index| index + 1)
            .unwrap_or(0);

        assert!(generated.expressions.contains("def custom_script_0(out) { //lineNo:2"));
        assert_eq!(map.translate(second), 3);

        Ok(())
    }

    #[test]
    fn test_message_is_a_list() -> Result<(), Error> {
        let generated = generate("a.html", "&{'hello', name}", vec![])?;

        assert!(generated.expressions.contains("  return ['hello', name];"));
        assert!(generated.statements.contains("message expression_0"));

        Ok(())
    }

    #[test]
    fn test_quote() {
        let quoted = quote("a \"b\"\\\nc");

        assert_eq!(quoted, "\"a \\\"b\\\"\\\\\\nc\"");
        assert_eq!(
            unquote(&format!("{quoted} rest")),
            Some(("a \"b\"\\\nc".to_string(), " rest"))
        );
    }
}
