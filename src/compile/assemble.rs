//! Assembles generated artifacts into a [`CompiledTemplate`].
//!
//! The expression artifact is assembled first, so that the statement artifact
//! can be checked against the methods it calls.
use super::{
    expr::{parse_expression, parse_script},
    generate::unquote,
    unit::{Body, ExpressionMethod, Instruction, Method, Op},
    CompiledTemplate, ExpressionUnit, Generated, LineMap, StatementUnit, TagLookup,
};
use crate::{
    location::{TemplateLocation, EXPRESSION_SUFFIX},
    log::{error_missing_tag, Error, ErrorKind},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static SENTINEL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*//lineNo:\d+$").expect("sentinel suffix pattern is valid"));

/// Assemble both artifacts of a template.
///
/// Fast-tags and legacy fast-tags named by the statement artifact are bound
/// through `lookup`.
///
/// # Errors
///
/// Returns an [`ErrorKind::Compilation`] [`Error`] if an expression or script
/// does not parse, an artifact is malformed, or a tag named by the artifact
/// cannot be bound.
pub fn assemble(
    location: TemplateLocation,
    generated: &Generated,
    lookup: &dyn TagLookup,
) -> Result<CompiledTemplate, Error> {
    let expressions = Assembler::new(&location, &generated.expressions).expressions()?;
    let statements =
        Assembler::new(&location, &generated.statements).statements(&expressions, lookup)?;

    Ok(CompiledTemplate::new(location, statements, expressions))
}

/// Reads one artifact line by line.
struct Assembler<'a> {
    location: &'a TemplateLocation,
    source: &'a str,
    lines: Vec<&'a str>,
    line_map: LineMap,
    /// Index of the next line, zero indexed.
    cursor: usize,
}

impl<'a> Assembler<'a> {
    fn new(location: &'a TemplateLocation, source: &'a str) -> Self {
        Self {
            location,
            source,
            lines: source.lines().collect(),
            line_map: LineMap::from_source(source),
            cursor: 0,
        }
    }

    /// Read the expression artifact.
    fn expressions(mut self) -> Result<ExpressionUnit, Error> {
        let package = self.header("package")?;
        let class = format!("{package}.{}", self.header("class")?);
        let mut methods = HashMap::new();

        while let Some((line, text)) = self.next_line() {
            if text.is_empty() {
                continue;
            }

            let declaration = text
                .strip_prefix("def ")
                .and_then(|rest| rest.strip_suffix(" {"))
                .ok_or_else(|| self.malformed(line, text))?;

            let (name, body) = if let Some(name) = declaration.strip_suffix("(out)") {
                (name, self.script(line)?)
            } else if let Some(name) = declaration.strip_suffix("()") {
                (name, self.expression(line)?)
            } else {
                return Err(self.malformed(line, text));
            };

            methods.insert(name.to_string(), ExpressionMethod { body, line });
        }

        Ok(ExpressionUnit {
            class,
            methods,
            line_map: self.line_map,
            source: self.source.to_string(),
        })
    }

    /// Read the body of an expression method declared on the given line.
    fn expression(&mut self, declared: usize) -> Result<Body, Error> {
        let (line, text) = self.next_line().ok_or_else(|| self.truncated(declared))?;
        let code = text
            .trim_start()
            .strip_prefix("return ")
            .and_then(|code| code.strip_suffix(';'))
            .ok_or_else(|| self.malformed(line, text))?;
        let expr = parse_expression(code).map_err(|e| self.locate(e, line))?;

        match self.next_line() {
            Some((_, "}")) => Ok(Body::Expr(expr)),
            Some((line, text)) => Err(self.malformed(line, text)),
            None => Err(self.truncated(declared)),
        }
    }

    /// Read the body of a script method declared on the given line.
    ///
    /// The body ends with a line holding only `}` and no sentinel.
    fn script(&mut self, declared: usize) -> Result<Body, Error> {
        let mut code = vec![];

        loop {
            match self.lines.get(self.cursor) {
                Some(&"}") => {
                    self.cursor += 1;
                    break;
                }
                Some(raw) => {
                    code.push(SENTINEL_SUFFIX.replace(raw, "").into_owned());
                    self.cursor += 1;
                }
                None => return Err(self.truncated(declared)),
            }
        }

        let statements = parse_script(&code.join("\n")).map_err(|e| self.locate(e, declared))?;

        Ok(Body::Script(statements))
    }

    /// Read the statement artifact.
    fn statements(
        mut self,
        expressions: &ExpressionUnit,
        lookup: &dyn TagLookup,
    ) -> Result<StatementUnit, Error> {
        let class = self.header("template")?;
        self.header("location")?;
        let expected = format!("{class}{EXPRESSION_SUFFIX}");
        if self.header("expressions")? != expected {
            return Err(Error::compilation(format!(
                "statement unit {class} does not belong to {}",
                expressions.class
            ))
            .with_name(self.location.relative_path()));
        }

        let mut methods = HashMap::new();
        let mut current: Option<(String, Method)> = None;

        while let Some((line, text)) = self.next_line() {
            if let Some((name, method)) = current.as_mut() {
                if text == "end" {
                    methods.insert(std::mem::take(name), std::mem::take(method));
                    current = None;
                } else {
                    let op = self.op(line, text, expressions, lookup)?;
                    method.instructions.push(Instruction { op, line });
                }
                continue;
            }
            if text.is_empty() {
                continue;
            }

            match text.strip_prefix("method ") {
                Some(name) => current = Some((name.to_string(), Method::default())),
                None => return Err(self.malformed(line, text)),
            }
        }
        if let Some((name, _)) = current {
            return Err(Error::compilation(format!("method {name} is never ended"))
                .with_name(self.location.relative_path()));
        }

        let unit = StatementUnit {
            class,
            methods,
            line_map: self.line_map.clone(),
            source: self.source.to_string(),
        };
        self.check_calls(&unit)?;

        Ok(unit)
    }

    /// Read one instruction.
    fn op(
        &self,
        line: usize,
        text: &str,
        expressions: &ExpressionUnit,
        lookup: &dyn TagLookup,
    ) -> Result<Op, Error> {
        let (word, rest) = text.split_once(' ').unwrap_or((text, ""));
        let expression = |name: &str| match expressions.method(name) {
            Some(_) => Ok(name.to_string()),
            None => Err(self.link(line, name)),
        };

        let op = match word {
            "text" => Op::Text(self.quoted(line, rest)?.0),
            "print" => Op::Print(expression(rest)?),
            "message" => Op::Message(expression(rest)?),
            "script" => Op::Script(expression(rest)?),
            "action" => {
                let (absolute, action) = rest
                    .split_once(' ')
                    .ok_or_else(|| self.malformed(line, text))?;
                Op::Action {
                    absolute: absolute == "true",
                    action: self.quoted(line, action)?.0,
                }
            }
            "call" => Op::Call(rest.to_string()),
            "enter" => Op::Enter(self.quoted(line, rest)?.0),
            "leave" => Op::Leave(self.quoted(line, rest)?.0),
            "args" => match content(rest) {
                Some(name) => Op::Args(Some(expression(&name)?)),
                None => Op::Args(None),
            },
            "if" => Op::If(content(rest)),
            "ifnot" => Op::IfNot(content(rest)),
            "else" => Op::Else(content(rest)),
            "elseif" => Op::ElseIf(content(rest)),
            "list" => Op::List(content(rest)),
            "extends" => Op::Extends(content(rest)),
            "dolayout" => Op::DoLayout,
            "fasttag" => {
                let (name, rest) = self.quoted(line, rest)?;
                let tag = lookup
                    .fast_tag(&name)
                    .ok_or_else(|| self.missing_tag(line, &name))?;
                Op::FastTag {
                    name,
                    tag,
                    content: content(rest),
                }
            }
            "legacytag" => {
                let (name, rest) = self.quoted(line, rest)?;
                let tag = lookup
                    .legacy_tag(&name)
                    .ok_or_else(|| self.missing_tag(line, &name))?;
                Op::LegacyTag {
                    name,
                    tag,
                    content: content(rest),
                }
            }
            "tagfile" => {
                let (name, rest) = self.quoted(line, rest)?;
                let (path, rest) = self.quoted(line, rest.trim_start())?;
                Op::TagFile {
                    name,
                    path,
                    content: content(rest),
                }
            }
            _ => return Err(self.malformed(line, text)),
        };

        Ok(op)
    }

    /// Check that every method called by the unit exists.
    fn check_calls(&self, unit: &StatementUnit) -> Result<(), Error> {
        for method in unit.methods.values() {
            for instruction in method.instructions.iter() {
                let called = match &instruction.op {
                    Op::Call(name) => Some(name),
                    Op::If(content)
                    | Op::IfNot(content)
                    | Op::Else(content)
                    | Op::ElseIf(content)
                    | Op::List(content)
                    | Op::Extends(content)
                    | Op::FastTag { content, .. }
                    | Op::LegacyTag { content, .. }
                    | Op::TagFile { content, .. } => content.as_ref(),
                    _ => None,
                };
                if let Some(name) = called.filter(|name| !unit.methods.contains_key(*name)) {
                    return Err(self.link(instruction.line, name));
                }
            }
        }

        Ok(())
    }

    /// Read a `<keyword> <value>` header line and return the value.
    fn header(&mut self, keyword: &str) -> Result<String, Error> {
        let (line, text) = self.next_line().ok_or_else(|| self.truncated(1))?;

        text.strip_prefix(keyword)
            .and_then(|rest| rest.strip_prefix(' '))
            .map(str::to_string)
            .ok_or_else(|| self.malformed(line, text))
    }

    /// Return the next line with its sentinel removed, and its 1-based number.
    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        let raw = self.lines.get(self.cursor)?;
        self.cursor += 1;

        let text = match SENTINEL_SUFFIX.find(raw) {
            Some(found) => &raw[..found.start()],
            None => raw,
        };

        Some((self.cursor, text))
    }

    fn quoted<'t>(&self, line: usize, text: &'t str) -> Result<(String, &'t str), Error> {
        unquote(text).ok_or_else(|| self.malformed(line, text))
    }

    /// Attach the template name and line to an [`Error`].
    fn locate(&self, error: Error, line: usize) -> Error {
        error
            .with_kind(ErrorKind::Compilation)
            .with_name(self.location.relative_path())
            .with_line(self.line_map.translate(line))
    }

    fn malformed(&self, line: usize, text: &str) -> Error {
        self.locate(Error::compilation(format!("malformed line `{text}`")), line)
    }

    fn truncated(&self, line: usize) -> Error {
        self.locate(Error::compilation("artifact ends unexpectedly"), line)
    }

    fn link(&self, line: usize, name: &str) -> Error {
        self.locate(Error::compilation(format!("no method named {name}")), line)
    }

    fn missing_tag(&self, line: usize, name: &str) -> Error {
        self.locate(error_missing_tag(name), line)
    }
}

/// Read the name of a content method, where `-` means no content.
fn content(text: &str) -> Option<String> {
    match text.trim() {
        "" | "-" => None,
        name => Some(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compile::{expr::Expr, Generator, RENDER_METHOD},
        tags::{legacy::LegacyTag, FastTag},
    };
    use std::sync::Arc;

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

    fn compile(source: &str) -> Result<CompiledTemplate, Error> {
        let location = TemplateLocation::embedded_at("views/a.html", source);
        let generated = Generator::new(&location, &Lookup)?.generate(source)?;

        assemble(location, &generated, &Lookup)
    }

    #[test]
    fn test_units_are_linked() -> Result<(), Error> {
        let template = compile("Hello ${name}!\n#{if a}b#{/if}#{get 'x' /}")?;
        let root = template
            .statements()
            .method(RENDER_METHOD)
            .map(|method| method.instructions().len());

        assert_eq!(root, Some(5));
        assert_eq!(
            template.expressions().class(),
            "fastergt.generated_templates.GTTemplate_views_a_htmlG"
        );
        assert!(matches!(
            template.expressions().method("expression_0").map(|m| &m.body),
            Some(Body::Expr(Expr::Variable(name))) if name == "name"
        ));

        Ok(())
    }

    #[test]
    fn test_instruction_lines_translate() -> Result<(), Error> {
        let template = compile("a\n\n${b}")?;
        let statements = template.statements();
        let print = statements
            .method(RENDER_METHOD)
            .and_then(|method| {
                method
                    .instructions()
                    .iter()
                    .find(|instruction| matches!(instruction.op, Op::Print(_)))
            })
            .map(|instruction| statements.line_map().translate(instruction.line));

        assert_eq!(print, Some(3));

        Ok(())
    }

    #[test]
    fn test_script_is_parsed() -> Result<(), Error> {
        let template = compile("%{\n x = 1\n y = x + 1\n}%")?;
        let script = template.expressions().method("custom_script_0");

        assert!(matches!(
            script.map(|m| &m.body),
            Some(Body::Script(statements)) if statements.len() == 2
        ));

        Ok(())
    }

    #[test]
    fn test_expression_error_is_located() {
        let error = compile("a\n${ 1 + }").unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Compilation);
        assert_eq!(error.line(), Some(2));
        assert_eq!(error.get_name(), Some("views/a.html"));
    }

    #[test]
    fn test_unbound_fast_tag() {
        let location = TemplateLocation::embedded_at("a.html", "");
        let generated = Generated {
            class: "fastergt.generated_templates.GTTemplate_a_html".to_string(),
            statements: "template fastergt.generated_templates.GTTemplate_a_html\n\
                location \"a.html\"\n\
                expressions fastergt.generated_templates.GTTemplate_a_htmlG\n\n\
                method _renderTemplate\n\
                fasttag \"nope\" - //lineNo:1\n\
                end\n"
                .to_string(),
            expressions: "package fastergt.generated_templates\nclass GTTemplate_a_htmlG\n"
                .to_string(),
        };
        let error = assemble(location, &generated, &Lookup).err();

        assert_eq!(
            error.map(|e| e.reason().to_string()),
            Some("Cannot find tag-implementation for 'nope'".to_string())
        );
    }
}
