//! Scoped collection of passthrough fields during emission.

use serde_json::{Map, Value};

/// A stack of string-keyed maps used by emitters to defer EXT_DATA and
/// SET_META fields until the nesting context they belong to closes.
///
/// Emitters push on every block-open opcode (MSG_START, CALL_START,
/// DEF_START, ...) and pop on the matching close; before popping they call
/// [`ExtrasCollector::merge_into`] on the JSON object for that block. Level 0
/// is the top level: after the main instruction loop its contents merge into
/// the outer request/response object.
///
/// For DEF blocks, where individual tools are separated by DEF_NAME rather
/// than nested START/END pairs, emitters call `merge_into` on the current
/// tool at each DEF_NAME boundary and at DEF_END; the merge resets the level
/// so the next tool starts clean.
#[derive(Debug)]
pub struct ExtrasCollector {
    levels: Vec<Map<String, Value>>,
}

impl Default for ExtrasCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtrasCollector {
    /// A collector with one (top) level.
    #[must_use]
    pub fn new() -> Self {
        ExtrasCollector {
            levels: vec![Map::new()],
        }
    }

    /// Starts collecting for a new nested block.
    pub fn push(&mut self) {
        self.levels.push(Map::new());
    }

    /// Discards the current level. Call [`ExtrasCollector::merge_into`] first
    /// to capture its extras. The top level is never popped.
    pub fn pop(&mut self) {
        if self.levels.len() > 1 {
            self.levels.pop();
        }
    }

    /// Stores a JSON value at the current level (EXT_DATA). The bytes are
    /// parsed into an owned value; input that is not valid JSON is dropped.
    pub fn add_json(&mut self, key: &str, json: &[u8]) {
        if let Ok(value) = serde_json::from_slice::<Value>(json) {
            self.current().insert(key.to_string(), value);
        }
    }

    /// Stores a string value at the current level (SET_META).
    pub fn add_string(&mut self, key: &str, val: &str) {
        self.current()
            .insert(key.to_string(), Value::String(val.to_string()));
    }

    /// Copies all extras at the current level into `obj`, then resets the
    /// level so the next sibling item at the same depth starts clean.
    pub fn merge_into(&mut self, obj: &mut Map<String, Value>) {
        let current = self.current();
        if current.is_empty() {
            return;
        }
        for (key, value) in std::mem::take(current) {
            obj.insert(key, value);
        }
    }

    /// The current nesting depth. 0 at top level.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    fn current(&mut self) -> &mut Map<String, Value> {
        if self.levels.is_empty() {
            self.levels.push(Map::new());
        }
        let top = self.levels.len() - 1;
        &mut self.levels[top]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scoping_and_reset() {
        let mut ec = ExtrasCollector::new();
        ec.add_json("seed", b"42");
        assert_eq!(ec.depth(), 0);

        ec.push();
        assert_eq!(ec.depth(), 1);
        ec.add_string("name", "first");

        let mut first = Map::new();
        ec.merge_into(&mut first);
        assert_eq!(first.get("name"), Some(&json!("first")));

        // Same depth, next sibling: the level was reset by merge_into.
        ec.add_string("name", "second");
        let mut second = Map::new();
        ec.merge_into(&mut second);
        assert_eq!(second.get("name"), Some(&json!("second")));
        ec.pop();

        let mut top = Map::new();
        ec.merge_into(&mut top);
        assert_eq!(top.get("seed"), Some(&json!(42)));
    }

    #[test]
    fn test_pop_never_drops_top_level() {
        let mut ec = ExtrasCollector::new();
        ec.pop();
        ec.pop();
        ec.add_string("still", "here");
        let mut obj = Map::new();
        ec.merge_into(&mut obj);
        assert_eq!(obj.get("still"), Some(&json!("here")));
    }

    #[test]
    fn test_invalid_json_dropped() {
        let mut ec = ExtrasCollector::new();
        ec.add_json("bad", b"{not json");
        let mut obj = Map::new();
        ec.merge_into(&mut obj);
        assert!(obj.is_empty());
    }
}
