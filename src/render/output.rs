use std::{
    fmt::{self, Display, Formatter, Write},
    io,
};

/// The output of a template, kept as an ordered list of text segments.
///
/// The last segment is the live one that writes go to. Inserting another
/// result moves its segments in and starts a new live segment, so output
/// produced by nested templates is spliced without being copied into a single
/// buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderingResult {
    segments: Vec<String>,
}

impl RenderingResult {
    pub fn new() -> Self {
        Self {
            segments: vec![String::new()],
        }
    }

    /// Return the live segment.
    pub(crate) fn live(&mut self) -> &mut String {
        if self.segments.is_empty() {
            self.segments.push(String::new());
        }
        let last = self.segments.len() - 1;

        &mut self.segments[last]
    }

    /// Append text to the live segment.
    pub fn push_str(&mut self, text: &str) {
        self.live().push_str(text);
    }

    /// Move the segments of another result to the end of this one.
    pub fn insert(&mut self, other: RenderingResult) {
        self.segments
            .extend(other.segments.into_iter().filter(|segment| !segment.is_empty()));
        self.segments.push(String::new());
    }

    /// Return the segments in output order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Return true if no text was written.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(String::is_empty)
    }

    /// Write every segment to the given writer, as UTF-8.
    pub fn write_output<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: io::Write,
    {
        for segment in self.segments.iter() {
            writer.write_all(segment.as_bytes())?;
        }

        Ok(())
    }
}

impl Default for RenderingResult {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RenderingResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for segment in self.segments.iter() {
            f.write_str(segment)?;
        }

        Ok(())
    }
}

impl Write for RenderingResult {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order() {
        let mut outer = RenderingResult::new();
        outer.push_str("a");

        let mut inner = RenderingResult::new();
        inner.push_str("b");
        outer.insert(inner);
        outer.push_str("c");

        assert_eq!(outer.to_string(), "abc");
        assert_eq!(outer.segments().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_write_output() -> io::Result<()> {
        let mut result = RenderingResult::default();
        write!(result, "{}-{}", 1, 2).map_err(|_| io::Error::new(io::ErrorKind::Other, "write"))?;

        let mut buffer = vec![];
        result.write_output(&mut buffer)?;

        assert_eq!(buffer, b"1-2");
        assert!(!result.is_empty());
        assert!(RenderingResult::new().is_empty());

        Ok(())
    }
}
