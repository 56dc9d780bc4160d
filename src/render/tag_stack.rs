use serde_json::{Map, Value};

/// Name of the frame at the bottom of every [`TagStack`].
pub const ROOT: &str = "ROOT";

/// Data key of the else flag, set on the frame enclosing an `if` or `list`.
pub const EXECUTE_NEXT_ELSE: &str = "_executeNextElse";

/// A tag being rendered, with data that tags may share with the tags they enclose.
#[derive(Debug, Clone)]
pub struct TagFrame {
    name: String,
    data: Map<String, Value>,
}

impl TagFrame {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }
}

/// The tags entered during one render, innermost last.
///
/// The stack never drops below its root frame.
#[derive(Debug, Clone)]
pub struct TagStack {
    frames: Vec<TagFrame>,
}

impl TagStack {
    pub fn new() -> Self {
        Self {
            frames: vec![TagFrame::new(ROOT)],
        }
    }

    pub(crate) fn enter(&mut self, name: &str) {
        self.frames.push(TagFrame::new(name));
    }

    pub(crate) fn leave(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Return the number of frames, root included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop every frame above the given depth.
    pub(crate) fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }

    pub fn current(&self) -> &TagFrame {
        &self.frames[self.frames.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut TagFrame {
        let last = self.frames.len() - 1;

        &mut self.frames[last]
    }

    /// Return the frame enclosing the current one.
    pub fn parent(&self) -> Option<&TagFrame> {
        self.frames.iter().rev().nth(1)
    }

    fn parent_mut(&mut self) -> Option<&mut TagFrame> {
        self.frames.iter_mut().rev().nth(1)
    }

    /// Return the innermost frame with the given name, the current one included.
    pub fn find(&self, name: &str) -> Option<&TagFrame> {
        self.frames.iter().rev().find(|frame| frame.name == name)
    }

    /// Mark that the next `else` sharing the enclosing frame must run.
    pub(crate) fn set_else_flag(&mut self) {
        self.put_else_flag(true);
    }

    pub(crate) fn clear_else_flag(&mut self) {
        self.put_else_flag(false);
    }

    fn put_else_flag(&mut self, value: bool) {
        if let Some(parent) = self.parent_mut() {
            parent.data.insert(EXECUTE_NEXT_ELSE.to_string(), Value::Bool(value));
        }
    }

    pub(crate) fn else_flag(&self) -> bool {
        self.parent()
            .and_then(|parent| parent.data.get(EXECUTE_NEXT_ELSE))
            .is_some_and(|flag| flag == &Value::Bool(true))
    }
}

impl Default for TagStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_else_flag_lives_in_parent() {
        let mut stack = TagStack::new();
        stack.enter("if");
        stack.set_else_flag();
        stack.leave();

        assert_eq!(stack.current().data().get(EXECUTE_NEXT_ELSE), Some(&Value::Bool(true)));

        stack.enter("else");
        assert!(stack.else_flag());
        stack.enter("if");
        assert!(!stack.else_flag());
        stack.leave();
        stack.clear_else_flag();
        stack.leave();

        stack.enter("else");
        assert!(!stack.else_flag());
    }

    #[test]
    fn test_root_is_kept() {
        let mut stack = TagStack::new();
        stack.leave();
        stack.enter("a");
        stack.truncate(0);

        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current().name(), ROOT);
        assert!(stack.parent().is_none());
    }

    #[test]
    fn test_find() {
        let mut stack = TagStack::new();
        stack.enter("select");
        stack.current_mut().data_mut().insert("selected".to_string(), 2.into());
        stack.enter("option");

        assert!(stack.find("select").is_some_and(|frame| frame.data().contains_key("selected")));
        assert!(stack.find("form").is_none());
    }
}
