use std::ops::{Index, Range};

/// An area within a line of template source, or within the text of an
/// expression.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct Region {
    /// Inclusive.
    pub begin: usize,
    /// Exclusive.
    pub end: usize,
}

impl Region {
    pub fn new(position: Range<usize>) -> Self {
        Self {
            begin: position.start,
            end: position.end,
        }
    }
}

impl Index<Region> for str {
    type Output = str;

    fn index(&self, region: Region) -> &Self::Output {
        &self[region.begin..region.end]
    }
}

impl From<Range<usize>> for Region {
    fn from(value: Range<usize>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_source() {
        let source = "Hello ${name}!";
        let region: Region = (8..12).into();

        assert_eq!(&source[region], "name");
        assert_eq!(region, Region::new(8..12));
    }
}
