use std::collections::HashMap;

use chronicle_shared::{MessageHandle, Snowflake};

/// Original event id to the message replayed for it. Lives for one run.
#[derive(Debug, Default)]
pub struct RemapTable {
    entries: HashMap<Snowflake, MessageHandle>,
    /// Original ids in delivery order.
    sent: Vec<Snowflake>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: Snowflake, replayed: MessageHandle) {
        if self.entries.insert(original, replayed).is_none() {
            self.sent.push(original);
        }
    }

    pub fn resolve(&self, original: Snowflake) -> Option<&MessageHandle> {
        self.entries.get(&original)
    }

    pub fn sent(&self) -> &[Snowflake] {
        &self.sent
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}
