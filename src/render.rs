//! Template rendering.
//!
//! A render call owns every template instance taking part in it: the root,
//! the templates it includes, the tag-files it invokes and the templates it
//! extends. Instances refer to each other by [`InstanceId`], and share the
//! [`TagStack`] and layout data of the call.
pub mod compare;
pub mod pipe;

mod eval;
mod output;
mod tag_stack;

pub use output::RenderingResult;
pub use tag_stack::{TagFrame, TagStack, EXECUTE_NEXT_ELSE};

use self::{compare::is_truthy, eval::Evaluator, pipe::stringify};
use crate::{
    compile::{Body, CompiledTemplate, Instruction, Op, RENDER_METHOD},
    escape::Escaping,
    host::Host,
    location::TemplateLocation,
    log::{
        error_missing_tag_file, Error, Frame, EMPTY_MESSAGE, NO_EXTENDING, NULL_MESSAGE_KEY,
        SPECIFY_TEMPLATE,
    },
    tags::legacy,
    Repository,
};
use serde_json::{json, Map, Value};
use std::{mem, sync::Arc};
use tracing::trace;

/// Binding entry set to `"true"` while the body of an inline script tag is
/// rendered, so that printed values are escaped for JavaScript strings.
pub const INSIDE_SCRIPT_TAG: &str = "__inside_script_tag";

/// Index of a template instance within a render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InstanceId(usize);

/// The body of a tag, rendered in the scope of the instance it was written in.
#[derive(Debug, Clone)]
pub struct Content {
    owner: InstanceId,
    method: String,
}

struct Instance {
    template: Arc<CompiledTemplate>,
    binding: Map<String, Value>,
    /// Arguments the instance was rendered with, before tag arguments.
    args: Map<String, Value>,
    output: RenderingResult,
    /// Location recorded by `#{extends}`.
    extends: Option<TemplateLocation>,
    /// The child template extending this one.
    extending: Option<InstanceId>,
    /// The parent template this one extends.
    extended: Option<InstanceId>,
    /// Body a tag-file was invoked with.
    body: Option<Content>,
}

/// State of one root render call.
pub(crate) struct Render<'repo> {
    repo: &'repo Repository,
    instances: Vec<Instance>,
    tags: TagStack,
    layout: Map<String, Value>,
}

/// Render a template as the root of a new render call.
///
/// The output of the outermost template in the extends chain is returned.
pub(crate) fn render_root(
    repo: &Repository,
    template: Arc<CompiledTemplate>,
    args: Map<String, Value>,
) -> Result<RenderingResult, Error> {
    trace!(template = template.location().relative_path(), "rendering");

    let mut render = Render {
        repo,
        instances: vec![],
        tags: TagStack::new(),
        layout: Map::new(),
    };
    let root = render.instantiate(template, None);
    render.render_instance(root, args, None, None)?;

    let mut outermost = root;
    while let Some(parent) = render.instance(outermost).extended {
        outermost = parent;
    }

    Ok(mem::take(&mut render.instance_mut(outermost).output))
}

impl<'repo> Render<'repo> {
    fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.0]
    }

    fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.instances[id.0]
    }

    fn instantiate(&mut self, template: Arc<CompiledTemplate>, body: Option<Content>) -> InstanceId {
        self.instances.push(Instance {
            template,
            binding: Map::new(),
            args: Map::new(),
            output: RenderingResult::new(),
            extends: None,
            extending: None,
            extended: None,
            body,
        });

        InstanceId(self.instances.len() - 1)
    }

    /// Render an instance.
    ///
    /// Once the body has run, a recorded `#{extends}` is resolved here when
    /// there is no caller, and handed to the caller otherwise.
    fn render_instance(
        &mut self,
        id: InstanceId,
        args: Map<String, Value>,
        tag_args: Option<Map<String, Value>>,
        caller: Option<InstanceId>,
    ) -> Result<(), Error> {
        let repo = self.repo;
        let mut binding = args.clone();
        binding.extend(tag_args.unwrap_or_default());

        let instance = self.instance_mut(id);
        instance.binding = binding;
        instance.args = args;

        self.call_method(id, RENDER_METHOD)
            .map_err(|error| repo.fix(error))?;

        let Some(location) = self.instance_mut(id).extends.take() else {
            return Ok(());
        };
        if let Some(caller) = caller {
            self.instance_mut(caller).extends = Some(location);
            return Ok(());
        }

        trace!(parent = location.relative_path(), "extending");
        let template = repo.get_template(&location)?;
        let parent = self.instantiate(template, None);
        self.instance_mut(parent).extending = Some(id);
        self.instance_mut(id).extended = Some(parent);
        let args = self.instance(id).args.clone();

        self.render_instance(parent, args, None, None)
    }

    /// Run a method of the statement unit of an instance.
    fn call_method(&mut self, id: InstanceId, name: &str) -> Result<(), Error> {
        let template = Arc::clone(&self.instance(id).template);
        let method = template
            .statements()
            .method(name)
            .ok_or_else(|| Error::template_runtime(format!("No such method {name}")))?;

        let depth = self.tags.depth();
        let mut args = Map::new();
        for instruction in method.instructions() {
            if let Err(error) = self.execute(id, &template, instruction, &mut args) {
                self.tags.truncate(depth);
                return Err(error.with_frame(Frame::generated(template.class(), name, instruction.line)));
            }
        }

        Ok(())
    }

    fn execute(
        &mut self,
        id: InstanceId,
        template: &CompiledTemplate,
        instruction: &Instruction,
        args: &mut Map<String, Value>,
    ) -> Result<(), Error> {
        match &instruction.op {
            Op::Text(text) => self.write_str(id, text),
            Op::Print(method) => {
                let value = self.evaluate(id, template, method)?;
                if !value.is_null() {
                    let text = self.object_to_string(id, &value);
                    self.write_str(id, &text);
                }
            }
            Op::Message(method) => {
                let value = self.evaluate(id, template, method)?;
                let text = self.message(id, value)?;
                self.write_str(id, &text);
            }
            Op::Action { absolute, action } => {
                let text = self.repo.host().actions().render(action, *absolute)?;
                self.write_str(id, &text);
            }
            Op::Script(method) => {
                self.evaluate(id, template, method)?;
            }
            Op::Call(method) => self.call_method(id, method)?,
            Op::Enter(name) => self.tags.enter(name),
            Op::Leave(_) => self.tags.leave(),
            Op::Args(method) => {
                *args = match method {
                    Some(method) => match self.evaluate(id, template, method)? {
                        Value::Object(map) => map,
                        other => {
                            return Err(Error::template_runtime(format!(
                                "Tag arguments must be a map, found {other}"
                            )))
                        }
                    },
                    None => Map::new(),
                };
            }
            Op::If(content) => self.conditional(id, content.as_deref(), is_truthy(arg(args)))?,
            Op::IfNot(content) => self.conditional(id, content.as_deref(), !is_truthy(arg(args)))?,
            Op::Else(content) => {
                if self.tags.else_flag() {
                    if let Some(content) = content {
                        self.call_method(id, content)?;
                    }
                }
                self.tags.clear_else_flag();
            }
            Op::ElseIf(content) => {
                if self.tags.else_flag() {
                    self.conditional(id, content.as_deref(), is_truthy(arg(args)))?;
                }
            }
            Op::List(content) => self.list(id, content.as_deref(), args)?,
            Op::Extends(content) => {
                let name = args
                    .get("arg")
                    .filter(|value| !value.is_null())
                    .map(stringify)
                    .ok_or_else(|| Error::template_runtime(SPECIFY_TEMPLATE))?;
                let location = self.resolve_template(id, &name).ok_or_else(|| {
                    Error::not_found(format!("Cannot find template {name}"))
                        .with_name(template.location().relative_path())
                        .with_line(template.statements().line_map().translate(instruction.line))
                })?;

                self.instance_mut(id).extends = Some(location);
                if let Some(content) = content {
                    self.call_method(id, content)?;
                }
            }
            Op::DoLayout => {
                let child = self
                    .instance(id)
                    .extending
                    .ok_or_else(|| Error::template_runtime(NO_EXTENDING))?;
                // The child finished rendering before its parent started.
                let output = mem::take(&mut self.instance_mut(child).output);
                self.instance_mut(id).output.insert(output);
            }
            Op::FastTag { tag, content, .. } => {
                let mut call = TagCall {
                    line: template.statements().line_map().translate(instruction.line),
                    content: content.clone().map(|method| Content { owner: id, method }),
                    instance: id,
                    render: self,
                };
                tag.render(&mut call, args)?;
            }
            Op::LegacyTag { tag, content, .. } => {
                let mut call = TagCall {
                    line: template.statements().line_map().translate(instruction.line),
                    content: content.clone().map(|method| Content { owner: id, method }),
                    instance: id,
                    render: self,
                };
                legacy::invoke(tag.as_ref(), &mut call, args)?;
            }
            Op::TagFile { path, content, .. } => self.tag_file(id, path, content.as_deref(), args)?,
        }

        Ok(())
    }

    /// Evaluate a method of the expression unit, running it when it is a script.
    fn evaluate(&mut self, id: InstanceId, template: &CompiledTemplate, name: &str) -> Result<Value, Error> {
        let expressions = template.expressions();
        let method = expressions
            .method(name)
            .ok_or_else(|| Error::template_runtime(format!("No such method {name}")))?;

        let Render {
            instances,
            layout,
            repo,
            ..
        } = self;
        let instance = &mut instances[id.0];
        let mut evaluator = Evaluator::new(
            &mut instance.binding,
            layout,
            repo.extensions(),
            instance.output.live(),
        );

        let result = match &method.body {
            Body::Expr(expr) => evaluator.evaluate(expr).map_err(|e| (e, method.line + 1)),
            Body::Script(statements) => match evaluator.run(statements) {
                Ok(()) => Ok(Value::Null),
                Err(e) => Err((e, method.line + 1 + evaluator.line())),
            },
        };

        result.map_err(|(error, line)| error.with_frame(Frame::generated(expressions.class(), name, line)))
    }

    fn write_str(&mut self, id: InstanceId, text: &str) {
        self.instance_mut(id).output.push_str(text);
    }

    /// Return the text a value prints as in the given instance.
    ///
    /// Raw data is never escaped. Other values are escaped for the extension
    /// of the template.
    fn object_to_string(&self, id: InstanceId, value: &Value) -> String {
        if let Some(text) = self.repo.host().raw().raw_text(value) {
            return text;
        }

        let instance = self.instance(id);
        let inside_script = instance
            .binding
            .get(INSIDE_SCRIPT_TAG)
            .and_then(Value::as_str)
            == Some("true");

        Escaping::for_path(instance.template.location().relative_path(), inside_script)
            .apply(&stringify(value))
    }

    /// Resolve a message list, where the first entry is the key.
    fn message(&self, id: InstanceId, value: Value) -> Result<String, Error> {
        let mut entries = match value {
            Value::Array(entries) => entries,
            value => vec![value],
        };
        if entries.is_empty() {
            return Err(Error::template_runtime(EMPTY_MESSAGE));
        }

        let key = entries.remove(0);
        if key.is_null() {
            return Err(Error::template_runtime(NULL_MESSAGE_KEY));
        }
        let args: Vec<String> = entries
            .iter()
            .map(|arg| self.object_to_string(id, arg))
            .collect();

        Ok(self.repo.host().messages().resolve(&stringify(&key), &args))
    }

    /// Run the content when the test passes, and set the else flag otherwise.
    fn conditional(&mut self, id: InstanceId, content: Option<&str>, test: bool) -> Result<(), Error> {
        self.tags.clear_else_flag();
        if !test {
            self.tags.set_else_flag();
            return Ok(());
        }

        match content {
            Some(content) => self.call_method(id, content),
            None => Ok(()),
        }
    }

    /// Run the content once per item, exposing the item and its position.
    fn list(&mut self, id: InstanceId, content: Option<&str>, args: &Map<String, Value>) -> Result<(), Error> {
        self.tags.clear_else_flag();

        let (name, prefix) = match args.get("as").filter(|value| !value.is_null()) {
            Some(name) => (stringify(name), stringify(name)),
            None => ("_".to_string(), String::new()),
        };
        let items = match args.get("items").or_else(|| args.get("arg")) {
            None | Some(Value::Null) => return Ok(()),
            Some(items) => eval::iterate(items)?,
        };
        if items.is_empty() {
            self.tags.set_else_flag();
            return Ok(());
        }
        let Some(content) = content else {
            return Ok(());
        };

        let count = items.len();
        for (index, item) in items.into_iter().enumerate() {
            let binding = &mut self.instance_mut(id).binding;
            binding.insert(name.clone(), item);
            binding.insert(format!("{prefix}_index"), json!(index + 1));
            binding.insert(format!("{prefix}_isFirst"), json!(index == 0));
            binding.insert(format!("{prefix}_isLast"), json!(index + 1 == count));
            binding.insert(
                format!("{prefix}_parity"),
                json!(if (index + 1) % 2 == 0 { "even" } else { "odd" }),
            );

            self.call_method(id, content)?;
        }

        Ok(())
    }

    /// Render a tag-file and insert its output.
    ///
    /// The tag-file sees the arguments of the caller, plus every tag argument
    /// prefixed with `_`, the binding of the caller as `_caller`, the argument
    /// map as `_attrs` and whether a body was given as `_body`.
    fn tag_file(
        &mut self,
        id: InstanceId,
        path: &str,
        content: Option<&str>,
        args: &Map<String, Value>,
    ) -> Result<(), Error> {
        let location = self
            .repo
            .host()
            .resolver()
            .resolve(path)
            .ok_or_else(|| error_missing_tag_file(path))?;
        let template = self.repo.get_template(&location)?;

        let mut tag_args = Map::new();
        tag_args.insert("_caller".to_string(), Value::Object(self.instance(id).binding.clone()));
        tag_args.insert("_body".to_string(), json!(content.is_some()));
        for (key, value) in args {
            tag_args.insert(format!("_{key}"), value.clone());
        }
        tag_args.insert("_attrs".to_string(), Value::Object(args.clone()));

        let body = content.map(|method| Content {
            owner: id,
            method: method.to_string(),
        });
        let args = self.instance(id).args.clone();
        let child = self.instantiate(template, body);
        self.render_instance(child, args, Some(tag_args), Some(id))?;

        let output = mem::take(&mut self.instance_mut(child).output);
        self.instance_mut(id).output.insert(output);

        Ok(())
    }

    /// Render content into a new result, leaving the output of its owner as it was.
    fn capture(&mut self, content: &Content) -> Result<RenderingResult, Error> {
        let saved = mem::take(&mut self.instance_mut(content.owner).output);
        let result = self.call_method(content.owner, &content.method);
        let captured = mem::replace(&mut self.instance_mut(content.owner).output, saved);

        result.map(|()| captured)
    }

    /// Resolve a template name, where `./` is relative to the folder of the
    /// template of the given instance.
    fn resolve_template(&self, id: InstanceId, name: &str) -> Option<TemplateLocation> {
        let query = match name.strip_prefix("./") {
            Some(rest) => {
                let location = self.instance(id).template.location();
                format!("{}{rest}", location.folder())
            }
            None => name.to_string(),
        };

        self.repo.host().resolver().resolve(&query)
    }
}

fn arg(args: &Map<String, Value>) -> &Value {
    args.get("arg").unwrap_or(&Value::Null)
}

/// A fast-tag invocation.
///
/// Gives a tag access to the instance it was written in, the body it
/// encloses and the state shared by the render call.
pub struct TagCall<'call, 'repo> {
    render: &'call mut Render<'repo>,
    instance: InstanceId,
    content: Option<Content>,
    line: usize,
}

impl<'call, 'repo> TagCall<'call, 'repo> {
    /// Append text to the output, without escaping.
    pub fn write_str(&mut self, text: &str) {
        self.render.write_str(self.instance, text);
    }

    /// Append a value to the output, escaped for this template.
    pub fn write_value(&mut self, value: &Value) {
        let text = self.object_to_string(value);
        self.write_str(&text);
    }

    /// Return the text a value prints as in this template.
    pub fn object_to_string(&self, value: &Value) -> String {
        self.render.object_to_string(self.instance, value)
    }

    /// Return the body of this tag.
    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    /// Return the body the enclosing tag-file was invoked with.
    pub fn body(&self) -> Option<&Content> {
        self.render.instance(self.instance).body.as_ref()
    }

    /// Render the body of this tag, or nothing when it has none.
    pub fn render_content(&mut self) -> Result<RenderingResult, Error> {
        match self.content.clone() {
            Some(content) => self.render.capture(&content),
            None => Ok(RenderingResult::new()),
        }
    }

    /// Render some content without writing it.
    pub fn render(&mut self, content: &Content) -> Result<RenderingResult, Error> {
        self.render.capture(content)
    }

    /// Append a rendered result to the output.
    pub fn insert(&mut self, output: RenderingResult) {
        self.render.instance_mut(self.instance).output.insert(output);
    }

    /// Return a variable from the scope of some content.
    pub fn property(&self, content: &Content, name: &str) -> Option<&Value> {
        self.render.instance(content.owner).binding.get(name)
    }

    pub fn set_property(&mut self, content: &Content, name: &str, value: Value) {
        self.render
            .instance_mut(content.owner)
            .binding
            .insert(name.to_string(), value);
    }

    pub fn remove_property(&mut self, content: &Content, name: &str) {
        self.render.instance_mut(content.owner).binding.remove(name);
    }

    /// Return the variables of this template.
    pub fn binding(&self) -> &Map<String, Value> {
        &self.render.instance(self.instance).binding
    }

    /// Return the layout data shared by every template of the render call.
    pub fn layout(&self) -> &Map<String, Value> {
        &self.render.layout
    }

    pub fn layout_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.render.layout
    }

    pub fn tags(&self) -> &TagStack {
        &self.render.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagStack {
        &mut self.render.tags
    }

    /// Make the next `#{else}` of the enclosing tag run.
    pub fn set_else_flag(&mut self) {
        self.render.tags.set_else_flag();
    }

    pub fn clear_else_flag(&mut self) {
        self.render.tags.clear_else_flag();
    }

    pub fn host(&self) -> &'repo Host {
        self.render.repo.host()
    }

    /// Return the relative path of this template.
    pub fn template_path(&self) -> &str {
        self.render
            .instance(self.instance)
            .template
            .location()
            .relative_path()
    }

    /// Return the template line the tag was written on.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Resolve a template name, where `./` is relative to the folder of this
    /// template.
    pub fn resolve_template(&self, name: &str) -> Option<TemplateLocation> {
        self.render.resolve_template(self.instance, name)
    }

    /// Render another template within this render call and insert its output.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the template cannot be compiled or rendering
    /// it fails.
    pub fn render_template(&mut self, location: &TemplateLocation, args: Map<String, Value>) -> Result<(), Error> {
        let template = self.render.repo.get_template(location)?;
        let child = self.render.instantiate(template, None);
        self.render
            .render_instance(child, args, None, Some(self.instance))?;

        let output = mem::take(&mut self.render.instance_mut(child).output);
        self.insert(output);

        Ok(())
    }
}

/// A compiled template bound to the repository it came from.
///
/// Every call to [`TemplateInstance::render`] is a new root render call with
/// fresh layout data and tag stack.
pub struct TemplateInstance<'repo> {
    repo: &'repo Repository,
    template: Arc<CompiledTemplate>,
}

impl<'repo> TemplateInstance<'repo> {
    pub(crate) fn new(repo: &'repo Repository, template: Arc<CompiledTemplate>) -> Self {
        Self { repo, template }
    }

    pub fn template(&self) -> &CompiledTemplate {
        &self.template
    }

    /// Render the template with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] located in the template, or in the application
    /// code it called, if rendering fails.
    pub fn render(&self, args: Map<String, Value>) -> Result<RenderingResult, Error> {
        render_root(self.repo, Arc::clone(&self.template), args)
    }

    pub fn render_to_string(&self, args: Map<String, Value>) -> Result<String, Error> {
        self.render(args).map(|output| output.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{TagCall, EXECUTE_NEXT_ELSE};
    use crate::{
        host::MemoryResolver,
        log::{Error, ErrorKind},
        tags::FastTagLibrary,
        Repository, Store, TemplateLocation,
    };
    use serde_json::{json, Map, Value};

    fn render(repository: &Repository, path: &str, source: &str, args: Value) -> Result<String, Error> {
        let location = TemplateLocation::embedded_at(path, source);
        let args = match args {
            Value::Object(args) => args,
            _ => Map::new(),
        };

        repository.render(&location, args)
    }

    #[test]
    fn test_hello() -> Result<(), Error> {
        let store = Store::new().with_must("name", "World");

        assert_eq!(
            Repository::default().render(&TemplateLocation::embedded_at("views/hello.html", "Hello ${name}!"), store.into())?,
            "Hello World!"
        );

        Ok(())
    }

    #[test]
    fn test_else_flag_is_visible_to_fast_tags() -> Result<(), Error> {
        fn peek(call: &mut TagCall<'_, '_>, _: &Map<String, Value>) -> Result<(), Error> {
            let flag = call
                .tags()
                .parent()
                .and_then(|frame| frame.data().get(EXECUTE_NEXT_ELSE))
                .cloned()
                .unwrap_or(Value::Null);
            call.write_value(&flag);
            Ok(())
        }

        let repository = Repository::default().with_fast_tags(FastTagLibrary::new().with_tag("peek", peek));

        assert_eq!(render(&repository, "views/peek.txt", "#{if false}x#{/if}#{peek /}", json!({}))?, "true");
        assert_eq!(render(&repository, "views/peek.txt", "#{if true}x#{/if}#{peek /}", json!({}))?, "xfalse");

        Ok(())
    }

    #[test]
    fn test_hostile_expressions_fail_cleanly() {
        let repository = Repository::default();

        let division = render(&repository, "views/math.html", "${(-9223372036854775807 - 1) / -1}", json!({}));
        let repeat = render(&repository, "views/repeat.html", "a\n${'a' * 9999999999999999}", json!({}));

        assert!(division.is_ok());
        assert!(repeat.is_err_and(|e| e.kind() == ErrorKind::WithSource && e.line() == Some(2)));
    }

    #[test]
    fn test_deep_inline_else_chain() -> Result<(), Error> {
        let depth = 30;
        let source = format!("{}z{}", "#{if false}a#{else}".repeat(depth), "#{/if}".repeat(depth));

        assert_eq!(render(&Repository::default(), "views/deep.html", &source, json!({}))?, "z");

        Ok(())
    }

    #[test]
    fn test_else_chains() -> Result<(), Error> {
        let repository = Repository::default();

        assert_eq!(
            render(&repository, "views/chain1.html", "#{if false}A#{elseif true}B#{else}C#{/if}", json!({}))?,
            "B"
        );
        assert_eq!(render(&repository, "views/chain2.html", "#{if false}A#{else}C#{/if}", json!({}))?, "C");
        assert_eq!(
            render(
                &repository,
                "views/chain3.html",
                "#{if a}A#{/if}#{elseif b}B#{/elseif}#{else}C#{/else}|#{ifnot a}N#{/ifnot}",
                json!({ "a": 0, "b": "" })
            )?,
            "C|N"
        );
        assert_eq!(
            render(&repository, "views/chain4.html", "#{if true}A#{elseif true}B#{else}C#{/if}", json!({}))?,
            "A"
        );

        Ok(())
    }

    #[test]
    fn test_list() -> Result<(), Error> {
        let repository = Repository::default();
        let source = "#{list items: items, as: 'i'}${i}:${i_index}:${i_isFirst}:${i_isLast}:${i_parity} #{/list}\
            #{else}empty#{/else}";

        assert_eq!(
            render(&repository, "views/list.html", source, json!({ "items": ["a", "b", "c"] }))?,
            "a:1:true:false:odd b:2:false:false:even c:3:false:true:odd "
        );
        assert_eq!(render(&repository, "views/list.html", source, json!({ "items": [] }))?, "empty");
        assert_eq!(
            render(&repository, "views/list2.html", "#{list 1..3}${_}${_index}#{/list}", json!({}))?,
            "112233"
        );

        Ok(())
    }

    #[test]
    fn test_extends() -> Result<(), Error> {
        let repository = Repository::default().with_resolver(
            MemoryResolver::new()
                .with_template("layout", "Header#{doLayout}Footer")
                .with_template("views/main.html", "<${title}>#{doLayout /}</${title}>")
                .with_template("views/base.html", "#{extends 'views/main.html' /}[#{doLayout /}]"),
        );

        assert_eq!(
            render(&repository, "views/child.html", "#{extends \"layout\"}Body#{/extends}", json!({}))?,
            "HeaderBodyFooter"
        );
        assert_eq!(
            render(&repository, "views/grandchild.html", "#{extends './base.html' /}x", json!({ "title": "t" }))?,
            "<t>[x]</t>"
        );

        Ok(())
    }

    #[test]
    fn test_layout_data_reaches_parent() -> Result<(), Error> {
        let repository = Repository::default().with_resolver(
            MemoryResolver::new().with_template("views/main.html", "<title>#{get 'title' /}</title>#{doLayout /}"),
        );

        assert_eq!(
            render(
                &repository,
                "views/page.html",
                "#{extends 'views/main.html' /}#{set title: 'Home' /}body",
                json!({})
            )?,
            "<title>Home</title>body"
        );

        Ok(())
    }

    #[test]
    fn test_extends_from_include_is_forwarded() -> Result<(), Error> {
        let repository = Repository::default().with_resolver(
            MemoryResolver::new()
                .with_template("views/main.html", "M[#{doLayout /}]")
                .with_template("views/decorate.html", "#{extends 'views/main.html' /}"),
        );

        assert_eq!(
            render(&repository, "views/page.html", "#{include 'views/decorate.html' /}page", json!({}))?,
            "M[page]"
        );

        Ok(())
    }

    #[test]
    fn test_missing_parent() {
        let result = render(&Repository::default(), "views/orphan.html", "a\n#{extends 'nope.html' /}", json!({}));

        assert!(result.is_err_and(|e| e.kind() == ErrorKind::TemplateNotFound
            && e.get_name() == Some("views/orphan.html")
            && e.line() == Some(2)));
    }

    #[test]
    fn test_do_layout_without_child() {
        let result = render(&Repository::default(), "views/lonely.html", "#{doLayout /}", json!({}));

        assert!(result.is_err_and(|e| e.reason() == crate::log::NO_EXTENDING));
    }

    #[test]
    fn test_escaping() -> Result<(), Error> {
        let repository = Repository::default();
        let args = json!({ "value": "<b>'x'</b>", "safe": { "$raw": "<i>" } });

        assert_eq!(
            render(&repository, "views/e.html", "${value}${safe}", args.clone())?,
            "&lt;b&gt;'x'&lt;/b&gt;<i>"
        );
        assert_eq!(
            render(&repository, "views/e.xml", "${value}", args.clone())?,
            "&lt;b&gt;&apos;x&apos;&lt;/b&gt;"
        );
        assert_eq!(render(&repository, "views/e.txt", "${value}", args.clone())?, "<b>'x'</b>");
        assert_eq!(render(&repository, "views/r.html", "${value.raw()}", args)?, "<b>'x'</b>");

        Ok(())
    }

    #[test]
    fn test_messages_and_scripts() -> Result<(), Error> {
        let repository = Repository::default();

        assert_eq!(render(&repository, "views/m.html", "&{'hello.world', 1}", json!({}))?, "hello.world");
        assert!(render(&repository, "views/m2.html", "&{null}", json!({}))
            .is_err_and(|e| e.reason() == crate::log::NULL_MESSAGE_KEY));
        assert_eq!(
            render(&repository, "views/s.html", "%{ total = 0\n for (n in [1, 2, 3]) { total += n } }%${total}", json!({}))?,
            "6"
        );
        assert_eq!(render(&repository, "views/o.html", "%{ out.print('<p>') }%", json!({}))?, "<p>");

        Ok(())
    }

    #[test]
    fn test_null_prints_nothing() -> Result<(), Error> {
        assert_eq!(render(&Repository::default(), "views/n.html", "[${missing}]", json!({}))?, "[]");

        Ok(())
    }
}
