use serde_json::{Map, Value};
use std::fmt::{Arguments, Display, Result, Write};

/// Wraps some underlying buffer by providing methods that write to it
/// in different formats.
///
/// Values are written the way the template language prints them: strings
/// without quotes, lists as `[a, b]` and maps as `[k:v]`.
pub struct Pipe<'buffer> {
    buffer: &'buffer mut (dyn Write + 'buffer),
}

impl<'buffer> Pipe<'buffer> {
    /// Create a new Pipe that writes to the given buffer.
    pub fn new(buffer: &'buffer mut String) -> Self {
        Self { buffer }
    }

    /// Write the given Value to the Pipe buffer.
    ///
    /// # Errors
    ///
    /// The Pipe supports all Value types, so the only error that will
    /// be returned is propagated from the [write!] macro itself.
    pub fn write_value(&mut self, value: &Value) -> Result {
        match value {
            Value::Null => self.write_null(),
            Value::String(string) => self.write_str(string),
            Value::Array(array) => self.write_array(array),
            Value::Object(object) => self.write_object(object),
            _ => self.write_display(value),
        }
    }

    /// Write the value to the buffer using the Display implementation.
    fn write_display(&mut self, value: impl Display) -> Result {
        write!(self.buffer, "{}", value)
    }

    /// Write the literal text "null" to the buffer.
    fn write_null(&mut self) -> Result {
        write!(self.buffer, "null")
    }

    /// Write the value to the buffer as a comma separated list surrounded
    /// by brackets.
    fn write_array(&mut self, value: &[Value]) -> Result {
        write!(self.buffer, "[")?;
        for (index, item) in value.iter().enumerate() {
            if index > 0 {
                write!(self.buffer, ", ")?;
            }
            self.write_value(item)?;
        }
        write!(self.buffer, "]")
    }

    /// Write the value to the buffer as `key:value` pairs surrounded by
    /// brackets, or `[:]` when empty.
    fn write_object(&mut self, value: &Map<String, Value>) -> Result {
        if value.is_empty() {
            return write!(self.buffer, "[:]");
        }

        write!(self.buffer, "[")?;
        for (index, (key, value)) in value.iter().enumerate() {
            if index > 0 {
                write!(self.buffer, ", ")?;
            }
            write!(self.buffer, "{}:", key)?;
            self.write_value(value)?;
        }
        write!(self.buffer, "]")
    }
}

impl Write for Pipe<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> Result {
        Write::write_str(self.buffer, s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> Result {
        Write::write_char(self.buffer, c)
    }

    #[inline]
    fn write_fmt(&mut self, args: Arguments<'_>) -> Result {
        Write::write_fmt(self.buffer, args)
    }
}

/// Return the text a value prints as, before escaping.
///
/// # Examples
///
/// ```
/// use fastergt::render::pipe::stringify;
/// use serde_json::json;
///
/// assert_eq!(stringify(&json!("a")), "a");
/// assert_eq!(stringify(&json!([1, "b", null])), "[1, b, null]");
/// assert_eq!(stringify(&json!({"k": [true]})), "[k:[true]]");
/// ```
pub fn stringify(value: &Value) -> String {
    let mut buffer = String::new();
    // Writing to a String does not fail.
    let _ = Pipe::new(&mut buffer).write_value(value);

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers() {
        assert_eq!(stringify(&json!(12)), "12");
        assert_eq!(stringify(&json!(-1.5)), "-1.5");
    }

    #[test]
    fn test_empty_collections() {
        assert_eq!(stringify(&json!([])), "[]");
        assert_eq!(stringify(&json!({})), "[:]");
    }

    #[test]
    fn test_nested() {
        assert_eq!(stringify(&json!({"a": 1, "b": {"c": "d"}})), "[a:1, b:[c:d]]");
    }
}
