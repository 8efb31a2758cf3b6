//! Per-session tool-call argument buffers.
//!
//! Fragments stay untyped text until the flush seam; nothing here parses
//! JSON. The store is owned by the session it serves — never a shared or
//! static collection — so concurrent sessions stay independent.

use tracing::{debug, warn};

/// One in-flight tool invocation's accumulating arguments.
#[derive(Debug)]
pub struct ToolCallBuffer {
    /// The invocation id.
    pub id: String,
    /// The tool name; may bind after the buffer opens.
    pub name: Option<String>,
    fragments: Vec<String>,
    seeded: bool,
}

impl ToolCallBuffer {
    fn new(id: String, name: Option<String>) -> Self {
        Self {
            id,
            name,
            fragments: Vec::new(),
            seeded: false,
        }
    }
}

/// A drained invocation, ready for the extractor.
#[derive(Debug, PartialEq, Eq)]
pub struct DrainedCall {
    /// The invocation id.
    pub id: String,
    /// The tool name, when one was ever bound.
    pub name: Option<String>,
    /// Fragments concatenated in arrival order (or the seed verbatim).
    pub arguments: String,
}

/// The ordered store of open buffers for one session.
#[derive(Debug, Default)]
pub struct ToolCallBuffers {
    open: Vec<ToolCallBuffer>,
}

impl ToolCallBuffers {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a buffer. A non-empty `seed` is the complete serialized
    /// arguments: the buffer is seeded and later fragments are ignored.
    pub fn begin(&mut self, id: impl Into<String>, name: Option<String>, seed: Option<String>) {
        let id = id.into();
        if self.find(&id).is_some() {
            warn!(%id, "begin for an already-open buffer; keeping the original");
            return;
        }
        let mut buffer = ToolCallBuffer::new(id, name);
        if let Some(seed) = seed {
            if !seed.is_empty() {
                buffer.fragments.push(seed);
                buffer.seeded = true;
            }
        }
        self.open.push(buffer);
    }

    /// Appends one fragment in arrival order. No-op once seeded; the seed is
    /// authoritative.
    pub fn append(&mut self, id: &str, fragment: impl Into<String>) {
        match self.find(id) {
            Some(buffer) => {
                if buffer.seeded {
                    debug!(%id, "fragment after seed ignored");
                } else {
                    buffer.fragments.push(fragment.into());
                }
            }
            None => {
                // Fragment before any begin: open implicitly so nothing is
                // silently dropped; a broken stream then surfaces as a parse
                // failure at flush.
                warn!(%id, "fragment for an unopened buffer; opening implicitly");
                let mut buffer = ToolCallBuffer::new(id.to_string(), None);
                buffer.fragments.push(fragment.into());
                self.open.push(buffer);
            }
        }
    }

    /// Late-binds the tool name.
    pub fn bind_name(&mut self, id: &str, name: impl Into<String>) {
        match self.find(id) {
            Some(buffer) => buffer.name = Some(name.into()),
            None => warn!(%id, "name for an unopened buffer; ignored"),
        }
    }

    /// Drains every open buffer, concatenating fragments in arrival order.
    pub fn drain_all(&mut self) -> Vec<DrainedCall> {
        std::mem::take(&mut self.open)
            .into_iter()
            .map(|buffer| DrainedCall {
                id: buffer.id,
                name: buffer.name,
                arguments: buffer.fragments.concat(),
            })
            .collect()
    }

    /// True when no invocation is in flight.
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    fn find(&mut self, id: &str) -> Option<&mut ToolCallBuffer> {
        self.open.iter_mut().find(|b| b.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_concatenate_in_arrival_order() {
        let mut buffers = ToolCallBuffers::new();
        buffers.begin("t1", Some("emit_okrt_actions".to_string()), None);
        buffers.append("t1", "{\"actions\":[{");
        buffers.append("t1", "\"op\":\"create\"}]}");
        let drained = buffers.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].arguments, "{\"actions\":[{\"op\":\"create\"}]}");
        // Round-trip: the concatenation parses back to the original object.
        let value: serde_json::Value = serde_json::from_str(&drained[0].arguments).unwrap();
        assert_eq!(value["actions"][0]["op"], "create");
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_seed_is_authoritative() {
        let mut buffers = ToolCallBuffers::new();
        buffers.begin("t1", Some("render_chart".to_string()), Some("{\"a\":1}".to_string()));
        buffers.append("t1", "{\"b\":2}");
        buffers.append("t1", "garbage");
        let drained = buffers.drain_all();
        assert_eq!(drained[0].arguments, "{\"a\":1}");
    }

    #[test]
    fn test_empty_seed_does_not_seed() {
        let mut buffers = ToolCallBuffers::new();
        buffers.begin("t1", None, Some(String::new()));
        buffers.append("t1", "{}");
        assert_eq!(buffers.drain_all()[0].arguments, "{}");
    }

    #[test]
    fn test_late_name_binding() {
        let mut buffers = ToolCallBuffers::new();
        buffers.begin("t1", None, None);
        buffers.bind_name("t1", "request_more_info");
        let drained = buffers.drain_all();
        assert_eq!(drained[0].name.as_deref(), Some("request_more_info"));
    }

    #[test]
    fn test_drain_preserves_begin_order() {
        let mut buffers = ToolCallBuffers::new();
        buffers.begin("a", None, None);
        buffers.begin("b", None, None);
        buffers.append("b", "2");
        buffers.append("a", "1");
        let drained = buffers.drain_all();
        assert_eq!(drained[0].id, "a");
        assert_eq!(drained[1].id, "b");
    }

    #[test]
    fn test_fragment_before_begin_opens_implicitly() {
        let mut buffers = ToolCallBuffers::new();
        buffers.append("ghost", "{\"x\":1}");
        let drained = buffers.drain_all();
        assert_eq!(drained[0].id, "ghost");
        assert_eq!(drained[0].name, None);
        assert_eq!(drained[0].arguments, "{\"x\":1}");
    }

    #[test]
    fn test_duplicate_begin_keeps_original() {
        let mut buffers = ToolCallBuffers::new();
        buffers.begin("t1", Some("first".to_string()), None);
        buffers.begin("t1", Some("second".to_string()), None);
        let drained = buffers.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].name.as_deref(), Some("first"));
    }
}
