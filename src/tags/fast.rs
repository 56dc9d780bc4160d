//! Fast-tags built into the engine.
//!
//! These are searched before any library registered on the repository, so a
//! custom tag can not shadow them.
use super::{FastTag, TagCall};
use crate::{
    escape::escape_html,
    location::TemplateLocation,
    log::{Error, MISSING_ERROR_KEY, MISSING_TEMPLATE, SPECIFY_TEMPLATE},
    render::{pipe::stringify, INSIDE_SCRIPT_TAG},
};
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::{collections::HashMap, sync::Arc};

static INTERNAL: Lazy<HashMap<&'static str, Arc<dyn FastTag>>> = Lazy::new(|| {
    let mut tags: HashMap<&'static str, Arc<dyn FastTag>> = HashMap::new();
    tags.insert("get", Arc::new(get));
    tags.insert("set", Arc::new(set));
    tags.insert("ifErrors", Arc::new(if_errors));
    tags.insert("ifError", Arc::new(if_error));
    tags.insert("errorClass", Arc::new(error_class));
    tags.insert("include", Arc::new(include));
    tags.insert("render", Arc::new(render));
    tags.insert("doBody", Arc::new(do_body));
    tags.insert("cache", Arc::new(cache));
    tags.insert("jsAction", Arc::new(js_action));
    tags.insert("option", Arc::new(option));
    tags.insert("secureInlineJavaScript", Arc::new(secure_inline_javascript));
    tags
});

/// Return the internal fast-tag with the given name.
pub fn resolve(name: &str) -> Option<Arc<dyn FastTag>> {
    INTERNAL.get(name).cloned()
}

/// Return the non-null `arg` of a tag as text.
fn arg(args: &Map<String, Value>) -> Option<String> {
    args.get("arg").filter(|value| !value.is_null()).map(stringify)
}

fn variable_name(args: &Map<String, Value>, tag: &str) -> Result<String, Error> {
    arg(args).ok_or_else(|| {
        Error::template_runtime(format!("Specify a variable name when using #{{{tag}/}}"))
    })
}

/// Print a layout value, or the body when the value is missing.
fn get(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let key = variable_name(args, "get")?;

    match call.layout().get(&key).filter(|value| !value.is_null()) {
        Some(value) => {
            let text = stringify(value);
            call.write_str(&text);
        }
        None => {
            let body = call.render_content()?;
            call.insert(body);
        }
    }

    Ok(())
}

/// Store a layout value, from the first named argument or from the rendered body.
fn set(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let named = args.iter().find(|(key, _)| key.as_str() != "arg");

    let (key, value) = match named {
        Some((key, value @ Value::String(_))) => (key.clone(), json!(call.object_to_string(value))),
        Some((key, value)) => (key.clone(), value.clone()),
        None => {
            let key = variable_name(args, "set")?;
            let body = call.render_content()?;

            (key, json!(body.to_string()))
        }
    };
    call.layout_mut().insert(key, value);

    Ok(())
}

/// Render the body when validation has failed, taking part in else chains.
fn if_errors(call: &mut TagCall<'_, '_>, _: &Map<String, Value>) -> Result<(), Error> {
    let failed = call.host().validation().has_errors();

    conditional(call, failed)
}

fn if_error(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let key = arg(args).ok_or_else(|| Error::template_runtime(MISSING_ERROR_KEY))?;
    let failed = call.host().validation().has_error(&key);

    conditional(call, failed)
}

fn conditional(call: &mut TagCall<'_, '_>, test: bool) -> Result<(), Error> {
    if test {
        call.clear_else_flag();
        let body = call.render_content()?;
        call.insert(body);
    } else {
        call.set_else_flag();
    }

    Ok(())
}

fn error_class(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let key = arg(args).ok_or_else(|| Error::template_runtime(MISSING_ERROR_KEY))?;
    if call.host().validation().has_error(&key) {
        call.write_str("hasError");
    }

    Ok(())
}

/// Render another template with the binding of this one.
fn include(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let location = template_arg(call, args)?;
    let mut template_args = call.binding().clone();
    template_args.insert("_isInclude".to_string(), json!(true));

    call.render_template(&location, template_args)
}

/// Render another template with the arguments of the tag.
fn render(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let location = template_arg(call, args)?;
    let mut template_args = args.clone();
    template_args.insert("_isInclude".to_string(), json!(true));

    call.render_template(&location, template_args)
}

fn template_arg(call: &TagCall<'_, '_>, args: &Map<String, Value>) -> Result<TemplateLocation, Error> {
    let name = arg(args).ok_or_else(|| Error::template_runtime(SPECIFY_TEMPLATE))?;

    call.resolve_template(&name)
        .ok_or_else(|| Error::template_runtime(MISSING_TEMPLATE))
}

/// Render the body a tag-file was invoked with.
///
/// Entries of `vars` are set on the binding of the body first, and the ones
/// that were not set before are removed again afterwards. With `as`, the
/// output is stored in the binding of the body instead of being printed.
fn do_body(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let Some(body) = call.body().cloned() else {
        return Ok(());
    };

    let mut reset = vec![];
    if let Some(Value::Object(vars)) = args.get("vars") {
        for (key, value) in vars {
            if call.property(&body, key).map_or(true, Value::is_null) {
                reset.push(key.clone());
            }
            call.set_property(&body, key, value.clone());
        }
    }

    let output = call.render(&body)?;
    match args.get("as").filter(|value| !value.is_null()) {
        Some(name) => call.set_property(&body, &stringify(name), json!(output.to_string())),
        None => call.insert(output),
    }

    for key in reset {
        call.remove_property(&body, &key);
    }

    Ok(())
}

/// Print the cached body, rendering and storing it on a miss.
fn cache(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let key = variable_name(args, "cache")?;
    let duration = args.get("for").filter(|value| !value.is_null()).map(stringify);

    if let Some(cached) = call.host().cache().get(&key) {
        call.write_str(&cached);
        return Ok(());
    }

    let text = call.render_content()?.to_string();
    call.host().cache().set(&key, &text, duration.as_deref());
    call.write_str(&text);

    Ok(())
}

fn js_action(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let pattern = arg(args).unwrap_or_default().replace("&amp;", "&");

    call.write_str(&format!(
        "function(options) {{var pattern = '{pattern}'; for(key in options) \
        {{ pattern = pattern.replace(':'+key, options[key]); }} return pattern }}"
    ));

    Ok(())
}

/// Print an `<option>`, selected when its value matches the `selected` value
/// of the enclosing `select` tag.
fn option(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
    let value = arg(args);
    let selected = call
        .tags()
        .find("select")
        .and_then(|frame| frame.data().get("selected"))
        .filter(|selected| !selected.is_null())
        .map(stringify);
    let is_selected = matches!((&value, &selected), (Some(value), Some(selected)) if value == selected);

    let mut text = format!("<option value=\"{}\" ", escape_html(value.as_deref().unwrap_or("")));
    if is_selected {
        text.push_str("selected");
    }
    text.push(' ');
    text.push_str(&serialize(args, &["selected", "value"]));
    text.push('>');
    call.write_str(&text);

    let body = call.render_content()?;
    call.insert(body);
    call.write_str("</option>");

    Ok(())
}

/// Render tag arguments as HTML attributes, skipping `arg` and the given names.
fn serialize(args: &Map<String, Value>, unless: &[&str]) -> String {
    let mut attributes = String::new();
    for (name, value) in args {
        if name == "arg" || unless.contains(&name.as_str()) {
            continue;
        }
        let value = if value.is_null() { String::new() } else { stringify(value) };
        attributes.push_str(&format!("{name}=\"{}\" ", escape_html(&value)));
    }

    attributes
}

/// Render the body as an inline script region, where printed values are
/// escaped for JavaScript strings.
fn secure_inline_javascript(call: &mut TagCall<'_, '_>, _: &Map<String, Value>) -> Result<(), Error> {
    let Some(content) = call.content().cloned() else {
        return Ok(());
    };

    call.set_property(&content, INSIDE_SCRIPT_TAG, json!("true"));
    let output = call.render(&content);
    call.set_property(&content, INSIDE_SCRIPT_TAG, json!("false"));
    call.insert(output?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        host::{MemoryResolver, Validation},
        Repository, RepositoryConfig,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failed;

    impl Validation for Failed {
        fn has_errors(&self) -> bool {
            true
        }

        fn has_error(&self, key: &str) -> bool {
            key == "user.name"
        }
    }

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn render_with(repository: &Repository, source: &str, args: Value) -> Result<String, Error> {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let location = TemplateLocation::embedded_at(format!("views/test{n}.html"), source);
        let args = match args {
            Value::Object(args) => args,
            _ => Map::new(),
        };

        repository.render(&location, args)
    }

    fn render_source(source: &str) -> Result<String, Error> {
        render_with(&Repository::default(), source, json!({}))
    }

    #[test]
    fn test_set_get() -> Result<(), Error> {
        assert_eq!(render_source("#{set index: 1/}#{get 'index'/}")?, "1");
        assert_eq!(render_source("#{get 'index'}missing#{/get}")?, "missing");
        assert_eq!(render_source("#{set 'title'}<b>T</b>#{/set}[#{get 'title'/}]")?, "[<b>T</b>]");
        assert_eq!(render_source("#{set title:'<i>'/}#{get 'title'/}")?, "&lt;i&gt;");

        Ok(())
    }

    #[test]
    fn test_set_get_counter() -> Result<(), Error> {
        let source = "#{set index: 0/}#{list items: ['a', 'b'], as: 'i'}\
            #{set index: index + 1/}#{/list}#{get 'index'/}";

        assert_eq!(render_source(source)?, "2");

        Ok(())
    }

    #[test]
    fn test_get_without_name() {
        assert!(render_source("#{get /}").is_err());
    }

    #[test]
    fn test_validation_tags() -> Result<(), Error> {
        let repository = Repository::new(RepositoryConfig::default()).with_validation(Failed);
        let source = "#{ifErrors}E#{/ifErrors}#{else}ok#{/else}|\
            #{ifError 'user.name'}N#{/ifError}#{else}-#{/else}|\
            #{ifError 'user.age'}A#{/ifError}#{else}-#{/else}|#{errorClass 'user.name'/}";

        assert_eq!(render_with(&repository, source, json!({}))?, "E|N|-|hasError");
        assert_eq!(render_source("#{ifErrors}E#{/ifErrors}#{else}ok#{/else}")?, "ok");
        assert!(render_source("#{ifError}x#{/ifError}").is_err_and(|e| e.reason() == MISSING_ERROR_KEY));

        Ok(())
    }

    #[test]
    fn test_include_and_render() -> Result<(), Error> {
        let repository = Repository::default().with_resolver(
            MemoryResolver::new()
                .with_template("views/part.html", "[${name}|${_isInclude}|${title ?: '-'}]"),
        );
        let args = json!({ "name": "taylor" });

        assert_eq!(
            render_with(&repository, "#{include 'views/part.html'/}", args.clone())?,
            "[taylor|true|-]"
        );
        assert_eq!(
            render_with(&repository, "#{render 'views/part.html', name: 'x', title: 'T'/}", args.clone())?,
            "[x|true|T]"
        );
        assert_eq!(
            render_with(&repository, "#{include './part.html'/}", args.clone())?,
            "[taylor|true|-]"
        );
        assert!(render_with(&repository, "#{include 'views/none.html'/}", args.clone())
            .is_err_and(|e| e.reason() == MISSING_TEMPLATE));
        assert!(render_with(&repository, "#{include /}", args)
            .is_err_and(|e| e.reason() == SPECIFY_TEMPLATE));

        Ok(())
    }

    #[test]
    fn test_cache() -> Result<(), Error> {
        let repository = Repository::default();
        let first = render_with(&repository, "#{cache 'k', for: '1h'}${v}#{/cache}", json!({ "v": 1 }))?;
        let second = render_with(&repository, "#{cache 'k'}${v}#{/cache}", json!({ "v": 2 }))?;

        assert_eq!(first, "1");
        assert_eq!(second, "1");

        Ok(())
    }

    #[test]
    fn test_js_action() -> Result<(), Error> {
        assert_eq!(
            render_source("#{jsAction '/users/:id?a=1&amp;b=2'/}")?,
            "function(options) {var pattern = '/users/:id?a=1&b=2'; for(key in options) \
            { pattern = pattern.replace(':'+key, options[key]); } return pattern }"
        );

        Ok(())
    }

    #[test]
    fn test_option_inside_select() -> Result<(), Error> {
        fn select(call: &mut TagCall<'_, '_>, args: &Map<String, Value>) -> Result<(), Error> {
            if let Some(selected) = args.get("selected") {
                call.tags_mut().current_mut().data_mut().insert("selected".to_string(), selected.clone());
            }
            let body = call.render_content()?;
            call.insert(body);
            Ok(())
        }

        let repository = Repository::default()
            .with_fast_tags(crate::tags::FastTagLibrary::new().with_tag("select", select));
        let source = "#{select selected: 2}#{option 1}One#{/option}#{option 2, class: 'x'}Two#{/option}#{/select}";

        assert_eq!(
            render_with(&repository, source, json!({}))?,
            "<option value=\"1\"  >One</option><option value=\"2\" selected class=\"x\" >Two</option>"
        );

        Ok(())
    }

    #[test]
    fn test_secure_inline_javascript() -> Result<(), Error> {
        let source = "#{secureInlineJavaScript}var a = '${v}';#{/secureInlineJavaScript}${v}";

        assert_eq!(
            render_with(&Repository::default(), source, json!({ "v": "it's <b>" }))?,
            "var a = 'it\\'s <b>';it's &lt;b&gt;"
        );

        Ok(())
    }

    #[test]
    fn test_do_body() -> Result<(), Error> {
        let repository = Repository::default().with_resolver(
            MemoryResolver::new()
                .with_template("tags/wrap.html", "<${_tag}>#{doBody vars: [n: 7] /}</${_tag}>")
                .with_template("tags/capture.html", "#{doBody as: 'captured' /}(${_caller.x})"),
        );

        assert_eq!(
            render_with(&repository, "#{wrap tag: 'p'}n=${n}#{/wrap}", json!({}))?,
            "<p>n=7</p>"
        );
        assert_eq!(
            render_with(&repository, "#{capture}x#{/capture}${captured}", json!({ "x": "X" }))?,
            "(X)x"
        );

        Ok(())
    }
}
