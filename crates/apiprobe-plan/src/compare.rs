//! Comparisons: the recorded intent of one call against one class.
//!
//! A POST records `new` (what we asked the server to create); GET and
//! DELETE record `old` (the lookup key) with `old_used` tracking the
//! subset actually sent; PUT/PATCH record both sides. The executor
//! reconciles these against the shadow store once the response is in.

use std::sync::Arc;

use apiprobe_spec::{Schema, METHOD_GET};
use apiprobe_types::JsonMap;
use serde_json::Value;

/// One intended mutation of one class.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    /// Lookup key for update/get/delete.
    pub old: Option<JsonMap>,
    /// The subset of `old` actually consulted by the call.
    pub old_used: JsonMap,
    /// Payload for post/put/patch.
    pub new: Option<JsonMap>,
    /// The class schema, for reconciliation-time matching.
    pub schema: Option<Arc<Schema>>,
}

impl Comparison {
    pub fn with_schema(schema: Option<Arc<Schema>>) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Record a key/value under the bucket the operation dictates: `old`
    /// (plus `old_used`) for gets, `new` for writes.
    ///
    /// A collision on the key means we moved on to the next element of an
    /// array payload; the value lands in a fresh comparison which the
    /// caller appends.
    pub fn set_for_op(&mut self, op: &str, key: &str, value: Value) -> Option<Comparison> {
        if op == METHOD_GET {
            let old = self.old.get_or_insert_with(JsonMap::new);
            if old.contains_key(key) {
                let mut next = Comparison::with_schema(self.schema.clone());
                let next_old = next.old.get_or_insert_with(JsonMap::new);
                next_old.insert(key.to_owned(), value.clone());
                next.old_used.insert(key.to_owned(), value);
                return Some(next);
            }
            old.insert(key.to_owned(), value.clone());
            self.old_used.insert(key.to_owned(), value);
            None
        } else {
            let new = self.new.get_or_insert_with(JsonMap::new);
            if new.contains_key(key) {
                let mut next = Comparison::with_schema(self.schema.clone());
                next.new.get_or_insert_with(JsonMap::new).insert(key.to_owned(), value);
                return Some(next);
            }
            new.insert(key.to_owned(), value);
            None
        }
    }
}
