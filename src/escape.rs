//! Output escaping.
//!
//! The escaping applied to a printed value is chosen by the extension of the
//! template's relative path. Values recognized as raw data are never escaped.
use serde_json::{json, Value};

/// Key of the object produced by [`raw`].
pub const RAW_KEY: &str = "$raw";

/// Escaping applied to a printed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escaping {
    None,
    Html,
    Xml,
    Csv,
    JavaScript,
}

impl Escaping {
    /// Choose the [`Escaping`] for a template.
    ///
    /// The checks are plain suffix checks, made in this order: `.xml`, `.csv`,
    /// then anything but `.html` is not escaped. Inside an inline script region
    /// of an HTML template, values are escaped for JavaScript strings.
    ///
    /// # Examples
    ///
    /// ```
    /// use fastergt::escape::Escaping;
    ///
    /// assert_eq!(Escaping::for_path("views/a.html", false), Escaping::Html);
    /// assert_eq!(Escaping::for_path("views/a.html.xml", false), Escaping::Xml);
    /// assert_eq!(Escaping::for_path("views/a.txt", true), Escaping::None);
    /// ```
    pub fn for_path(relative_path: &str, inside_script: bool) -> Self {
        if relative_path.ends_with(".xml") {
            Escaping::Xml
        } else if relative_path.ends_with(".csv") {
            Escaping::Csv
        } else if !relative_path.ends_with(".html") {
            Escaping::None
        } else if inside_script {
            Escaping::JavaScript
        } else {
            Escaping::Html
        }
    }

    /// Escape the given text.
    pub fn apply(self, text: &str) -> String {
        match self {
            Escaping::None => text.to_string(),
            Escaping::Html => escape_html(text),
            Escaping::Xml => escape_xml(text),
            Escaping::Csv => escape_csv(text),
            Escaping::JavaScript => escape_javascript(text),
        }
    }
}

/// Recognizes values that bypass escaping.
pub trait RawData: Send + Sync {
    /// Return the text of the value if it is raw data.
    fn raw_text(&self, value: &Value) -> Option<String>;
}

/// Treats an object whose only key is [`RAW_KEY`] as raw data.
///
/// This is the default [`RawData`] of a repository, and the shape produced
/// by [`raw`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RawMarker;

impl RawData for RawMarker {
    fn raw_text(&self, value: &Value) -> Option<String> {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }

        match object.get(RAW_KEY)? {
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Wrap text so that it is printed without escaping.
///
/// # Examples
///
/// ```
/// use fastergt::escape::{raw, RawData, RawMarker};
///
/// assert_eq!(RawMarker.raw_text(&raw("<b>")), Some("<b>".to_string()));
/// ```
pub fn raw<T>(text: T) -> Value
where
    T: Into<String>,
{
    json!({ RAW_KEY: text.into() })
}

/// Escape `&`, `<`, `>` and `"`.
pub fn escape_html(text: &str) -> String {
    let mut buffer = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => buffer.push_str("&amp;"),
            '<' => buffer.push_str("&lt;"),
            '>' => buffer.push_str("&gt;"),
            '"' => buffer.push_str("&quot;"),
            c => buffer.push(c),
        }
    }

    buffer
}

/// Escape `&`, `<`, `>`, `"` and `'`.
pub fn escape_xml(text: &str) -> String {
    let mut buffer = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => buffer.push_str("&amp;"),
            '<' => buffer.push_str("&lt;"),
            '>' => buffer.push_str("&gt;"),
            '"' => buffer.push_str("&quot;"),
            '\'' => buffer.push_str("&apos;"),
            c => buffer.push(c),
        }
    }

    buffer
}

/// Quote a CSV field when it contains a comma, quote or line break.
///
/// Quotes inside a quoted field are doubled.
pub fn escape_csv(text: &str) -> String {
    if !text.contains([',', '"', '\r', '\n']) {
        return text.to_string();
    }

    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Escape text for use inside a JavaScript string literal.
///
/// Characters outside ASCII are kept as they are.
pub fn escape_javascript(text: &str) -> String {
    let mut buffer = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match c {
            '\u{8}' => buffer.push_str("\\b"),
            '\n' => buffer.push_str("\\n"),
            '\t' => buffer.push_str("\\t"),
            '\u{c}' => buffer.push_str("\\f"),
            '\r' => buffer.push_str("\\r"),
            c if (c as u32) < 32 => buffer.push_str(&format!("\\u{:04X}", c as u32)),
            '\'' => buffer.push_str("\\'"),
            '"' => buffer.push_str("\\\""),
            '\\' => buffer.push_str("\\\\"),
            '/' => buffer.push_str("\\/"),
            c => buffer.push(c),
        }
    }

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html() {
        assert_eq!(escape_html("<b>\"a\" & 'b'</b>"), "&lt;b&gt;&quot;a&quot; &amp; 'b'&lt;/b&gt;");
    }

    #[test]
    fn test_xml() {
        assert_eq!(escape_xml("<a href='x'>"), "&lt;a href=&apos;x&apos;&gt;");
    }

    #[test]
    fn test_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_javascript() {
        assert_eq!(escape_javascript("it's </script>\n"), "it\\'s <\\/script>\\n");
        assert_eq!(escape_javascript("\u{1}é"), "\\u0001é");
    }

    #[test]
    fn test_suffix_order() {
        assert_eq!(Escaping::for_path("a.csv", true), Escaping::Csv);
        assert_eq!(Escaping::for_path("a.html", true), Escaping::JavaScript);
        assert_eq!(Escaping::for_path("a.htm", false), Escaping::None);
    }

    #[test]
    fn test_raw_marker() {
        assert_eq!(RawMarker.raw_text(&json!({ RAW_KEY: 5 })), Some("5".to_string()));
        assert_eq!(RawMarker.raw_text(&json!({ RAW_KEY: "a", "b": 1 })), None);
        assert_eq!(RawMarker.raw_text(&json!("<b>")), None);
    }
}
