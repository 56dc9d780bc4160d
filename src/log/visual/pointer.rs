use std::{
    cmp::max,
    fmt::{Formatter, Result},
};

use super::{
    super::{RESET, YELLOW},
    {get_width, Visual, BLANK, EQUAL, HIGHLIGHT, PIPE},
};
use crate::region::Region;

/// A type of `Visual` that points to a specific location within a line of
/// template source.
#[derive(Debug, PartialEq)]
pub struct Pointer {
    /// The line that the Pointer is pointing to.
    ///
    /// This number should be zero indexed.
    line: usize,
    /// The display column that the Pointer is pointing to.
    ///
    /// This number should be zero indexed.
    column: usize,
    /// The display width of the object being highlighted.
    length: usize,
    /// The actual line of text that is being pointed to.
    text: String,
}

impl Pointer {
    /// Create a new Visual over the given line of text and a [`Region`] within it.
    ///
    /// A `Region` that reaches past the end of the line is clamped.
    pub fn new(text: &str, line: usize, region: Region) -> Self {
        let text = text.trim_end_matches('\r');
        let begin = region.begin.min(text.len());
        let end = region.end.clamp(begin, text.len());
        let column = text.get(..begin).map(get_width).unwrap_or(0);
        let length = max(1, text.get(begin..end).map(get_width).unwrap_or(0));

        Self {
            line,
            column,
            length,
            text: text.to_string(),
        }
    }
}

impl Visual for Pointer {
    fn display(
        &self,
        formatter: &mut Formatter<'_>,
        template: Option<&str>,
        help: Option<&str>,
    ) -> Result {
        let num = (self.line + 1).to_string();
        let col = self.column + 1;
        let pad = get_width(&num);
        let align = self.column + self.length;

        let extra = "-".repeat(3_usize.saturating_sub(self.length));
        let name = template.unwrap_or("?");
        let text = &self.text;
        let underline = HIGHLIGHT.repeat(self.length);

        write!(
            formatter,
            "\n {BLANK:pad$}--> {name}:{num}:{col}\
             \n {BLANK:pad$} {PIPE}\
             \n {num:>} {PIPE} {text}\
             \n {BLANK:pad$} {PIPE} {YELLOW}{underline:>align$}{RESET}{extra}\
             \n {BLANK:pad$} {PIPE}\n",
        )?;

        if let Some(help) = help {
            writeln!(formatter, "{BLANK:pad$} {EQUAL} help: {help}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_column_and_length() {
        let pointer = Pointer::new("a ${name b", 3, Region::new(2..10));

        assert_eq!(pointer.line, 3);
        assert_eq!(pointer.column, 2);
        assert_eq!(pointer.length, 8);
    }

    #[test]
    fn test_pointer_clamps_region() {
        let pointer = Pointer::new("abc\r", 0, Region::new(2..40));

        assert_eq!(pointer.text, "abc");
        assert_eq!(pointer.length, 1);
    }
}
