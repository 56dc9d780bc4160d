use super::{expr::{Expr, Statement}, LineMap};
use crate::{
    location::TemplateLocation,
    tags::{legacy::LegacyTag, FastTag},
};
use std::{collections::HashMap, sync::Arc};

/// A template ready to be rendered.
///
/// Holds the statement unit and the expression unit it calls into, each with
/// its own [`LineMap`]. Immutable once assembled, and shared by every render
/// of the template.
pub struct CompiledTemplate {
    location: TemplateLocation,
    statements: StatementUnit,
    expressions: ExpressionUnit,
}

impl CompiledTemplate {
    pub(crate) fn new(
        location: TemplateLocation,
        statements: StatementUnit,
        expressions: ExpressionUnit,
    ) -> Self {
        Self {
            location,
            statements,
            expressions,
        }
    }

    /// Return the [`TemplateLocation`] the template was compiled from.
    pub fn location(&self) -> &TemplateLocation {
        &self.location
    }

    /// Return the fully qualified class name of the statement unit.
    pub fn class(&self) -> &str {
        &self.statements.class
    }

    pub fn statements(&self) -> &StatementUnit {
        &self.statements
    }

    pub fn expressions(&self) -> &ExpressionUnit {
        &self.expressions
    }
}

impl std::fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("location", &self.location)
            .field("class", &self.statements.class)
            .finish_non_exhaustive()
    }
}

/// Control flow of a template, as named methods of instructions.
pub struct StatementUnit {
    pub(crate) class: String,
    pub(crate) methods: HashMap<String, Method>,
    pub(crate) line_map: LineMap,
    pub(crate) source: String,
}

impl StatementUnit {
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Return the method with the given name.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn line_map(&self) -> &LineMap {
        &self.line_map
    }

    /// Return the artifact the unit was assembled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A list of instructions run in order.
#[derive(Default)]
pub struct Method {
    pub(crate) instructions: Vec<Instruction>,
}

impl Method {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

/// One instruction, with the 1-based line of the artifact it was read from.
pub struct Instruction {
    pub op: Op,
    pub line: usize,
}

/// Operations of the statement unit.
///
/// Methods of the expression unit are referred to by name. `content` names the
/// method rendering the body of a tag, and is `None` for a tag without body.
pub enum Op {
    /// Append text to the output.
    Text(String),
    /// Evaluate an expression and print it with escaping, unless it is null.
    Print(String),
    /// Evaluate a message list and print the resolved message.
    Message(String),
    /// Print the URL of an action.
    Action { absolute: bool, action: String },
    /// Run a script method.
    Script(String),
    /// Run another method of the statement unit.
    Call(String),
    /// Push a tag frame.
    Enter(String),
    /// Evaluate the argument map of the current tag.
    Args(Option<String>),
    /// Pop the tag frame.
    Leave(String),
    If(Option<String>),
    IfNot(Option<String>),
    Else(Option<String>),
    ElseIf(Option<String>),
    List(Option<String>),
    Extends(Option<String>),
    DoLayout,
    FastTag {
        name: String,
        tag: Arc<dyn FastTag>,
        content: Option<String>,
    },
    LegacyTag {
        name: String,
        tag: Arc<dyn LegacyTag>,
        content: Option<String>,
    },
    TagFile {
        name: String,
        path: String,
        content: Option<String>,
    },
}

/// Expressions, tag argument lists and scripts of a template.
pub struct ExpressionUnit {
    pub(crate) class: String,
    pub(crate) methods: HashMap<String, ExpressionMethod>,
    pub(crate) line_map: LineMap,
    pub(crate) source: String,
}

impl ExpressionUnit {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn method(&self, name: &str) -> Option<&ExpressionMethod> {
        self.methods.get(name)
    }

    pub fn line_map(&self) -> &LineMap {
        &self.line_map
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A method of the expression unit.
pub struct ExpressionMethod {
    pub body: Body,
    /// 1-based artifact line of the declaration.
    ///
    /// The body starts on the following line.
    pub line: usize,
}

pub enum Body {
    Expr(Expr),
    Script(Vec<Statement>),
}
