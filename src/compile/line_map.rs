use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

/// Comment that ends every generated line originating from template source.
pub const SENTINEL: &str = "//lineNo:";

static SENTINEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"//lineNo:(\d+)$").expect("sentinel pattern is valid"));

/// Maps lines of a generated artifact back to lines of the template it was
/// generated from.
///
/// Indexed by 0-based generated line. Each entry is a 1-based template line, or
/// `None` for scaffolding lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineMap {
    lines: Vec<Option<usize>>,
}

impl LineMap {
    /// Create a [`LineMap`] from an explicit list of template lines.
    pub fn new(lines: Vec<Option<usize>>) -> Self {
        Self { lines }
    }

    /// Create a [`LineMap`] by reading the sentinel comment at the end of each
    /// line of a generated artifact.
    ///
    /// # Examples
    ///
    /// ```
    /// use fastergt::compile::LineMap;
    ///
    /// let map = LineMap::from_source("class A\n  out(a) //lineNo:4\n}");
    ///
    /// assert_eq!(map.translate(2), 4);
    /// assert_eq!(map.translate(3), 4);
    /// assert_eq!(map.translate(1), 1);
    /// ```
    pub fn from_source(source: &str) -> Self {
        let lines = source
            .split('\n')
            .map(|line| {
                SENTINEL_PATTERN
                    .captures(line.trim_end_matches('\r'))
                    .and_then(|captures| captures.get(1))
                    .and_then(|number| number.as_str().parse().ok())
            })
            .collect();

        Self { lines }
    }

    /// Translate a 1-based generated line into a 1-based template line.
    ///
    /// A line past the end is clamped to the last line. Scaffolding lines resolve
    /// to the nearest mapped line above them, and 1 is returned when there is none.
    pub fn translate(&self, line: usize) -> usize {
        let mut index = line.saturating_sub(1).min(self.lines.len().saturating_sub(1));

        loop {
            match self.lines.get(index) {
                Some(Some(mapped)) => return *mapped,
                _ if index == 0 => return 1,
                _ => index -= 1,
            }
        }
    }

    /// Return the number of generated lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Return true if the [`LineMap`] has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Writes the lookup table as comma separated values, with `null` for
/// scaffolding lines.
impl Display for LineMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        for (index, line) in self.lines.iter().enumerate() {
            if index > 0 {
                write!(f, ",")?;
            }
            match line {
                Some(line) => write!(f, "{line}")?,
                None => write!(f, "null")?,
            }
        }

        Ok(())
    }
}
