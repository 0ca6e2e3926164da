//! The shadow store: an in-memory, per-class mirror of server-side object
//! state.
//!
//! Every definition in the spec gets a class collection. The executor
//! inserts on POST, updates on PUT/PATCH, removes on DELETE and verifies
//! GETs against the collections. Matching is association-aware: an entry
//! matches when the criteria predicate accepts its data *and* every
//! class-keyed association stated in the query deep-equals the stored one.
//!
//! A suite obtains a [`ShadowDb::clone_schema`] overlay at run start so
//! cross-test references resolve locally before falling through to the
//! plan-level store.

use std::collections::BTreeMap;
use std::sync::Arc;

use apiprobe_error::{ProbeError, Result};
use apiprobe_spec::{find_matching_schema, ApiSpec, Schema};
use apiprobe_types::{map_combine, values_match, JsonMap};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

/// Criteria predicate: `(criteria, entry_data) -> bool`.
pub type Matcher = fn(&Value, &Value) -> bool;

/// The default equality: everything the criteria states must be found on
/// the entry, with the time-format tolerance.
pub fn match_all_fields(criteria: &Value, existing: &Value) -> bool {
    values_match(criteria, existing)
}

/// The wildcard predicate.
pub fn match_always(_criteria: &Value, _existing: &Value) -> bool {
    true
}

/// No result-count limit.
pub const NO_LIMIT: usize = usize::MAX;

/// Class name → the foreign object used to reach this one.
pub type Associations = BTreeMap<String, Value>;

/// One stored object plus the associations it was created under.
#[derive(Debug, Clone)]
pub struct DbEntry {
    pub data: Value,
    pub associations: Associations,
}

impl DbEntry {
    fn matches(&self, criteria: &Value, associations: &Associations, matcher: Matcher) -> bool {
        for (class, assoc) in associations {
            match self.associations.get(class) {
                Some(stored) => {
                    if !values_match(assoc, stored) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        matcher(criteria, &self.data)
    }

    /// Dedup equivalence: data matches in both directions, so a formatting
    /// difference in timestamps does not create a second entry.
    fn same_data(&self, data: &Value) -> bool {
        values_match(data, &self.data) && values_match(&self.data, data)
    }
}

/// The per-class collection: ordered entries sharing one schema.
#[derive(Debug, Clone)]
pub struct ClassDb {
    pub class: String,
    pub schema: Arc<Schema>,
    pub no_history: bool,
    entries: Vec<DbEntry>,
}

impl ClassDb {
    fn new(class: String, schema: Arc<Schema>) -> Self {
        Self {
            class,
            schema,
            no_history: false,
            entries: Vec::new(),
        }
    }

    /// Share the schema, drop the entries.
    fn clone_schema(&self) -> Self {
        Self {
            class: self.class.clone(),
            schema: Arc::clone(&self.schema),
            no_history: self.no_history,
            entries: Vec::new(),
        }
    }

    fn insert(&mut self, data: Value, mut associations: Associations) {
        associations.remove(&self.class);
        if !self.no_history && self.entries.iter().any(|e| e.same_data(&data)) {
            return;
        }
        self.entries.push(DbEntry { data, associations });
    }

    fn find(
        &self,
        criteria: &Value,
        associations: &Associations,
        matcher: Matcher,
        limit: usize,
    ) -> Vec<Value> {
        self.entries
            .iter()
            .filter(|e| e.matches(criteria, associations, matcher))
            .take(limit)
            .map(|e| e.data.clone())
            .collect()
    }

    fn delete(
        &mut self,
        criteria: &Value,
        associations: &Associations,
        matcher: Matcher,
        limit: usize,
    ) -> usize {
        let mut removed = 0;
        self.entries.retain(|e| {
            if removed < limit && e.matches(criteria, associations, matcher) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    fn update(
        &mut self,
        criteria: &Value,
        associations: &Associations,
        matcher: Matcher,
        new_obj: &JsonMap,
        limit: usize,
        patch: bool,
    ) -> usize {
        let mut updated = 0;
        for entry in &mut self.entries {
            if updated >= limit {
                break;
            }
            if !entry.matches(criteria, associations, matcher) {
                continue;
            }
            if patch {
                if let Value::Object(data) = &mut entry.data {
                    map_combine(data, new_obj);
                } else {
                    entry.data = Value::Object(new_obj.clone());
                }
            } else {
                entry.data = Value::Object(new_obj.clone());
            }
            updated += 1;
        }
        updated
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The store: a mutex-guarded class map plus the governing spec.
///
/// Cloning the handle shares the underlying map; [`Self::clone_schema`]
/// makes an independent overlay instead.
#[derive(Clone)]
pub struct ShadowDb {
    classes: Arc<Mutex<BTreeMap<String, ClassDb>>>,
    spec: Arc<ApiSpec>,
}

impl ShadowDb {
    /// Build a store with one (empty) collection per definition.
    pub fn new(spec: Arc<ApiSpec>) -> Self {
        let mut classes = BTreeMap::new();
        for (name, schema) in &spec.definitions {
            classes.insert(
                name.clone(),
                ClassDb::new(name.clone(), Arc::new(schema.clone())),
            );
        }
        Self {
            classes: Arc::new(Mutex::new(classes)),
            spec,
        }
    }

    pub fn spec(&self) -> &Arc<ApiSpec> {
        &self.spec
    }

    /// A fresh store sharing the schema index but none of the entries —
    /// the per-suite overlay.
    pub fn clone_schema(&self) -> Self {
        let classes = self
            .classes
            .lock()
            .iter()
            .map(|(name, class_db)| (name.clone(), class_db.clone_schema()))
            .collect();
        Self {
            classes: Arc::new(Mutex::new(classes)),
            spec: Arc::clone(&self.spec),
        }
    }

    /// Drop all entries, keep the schema index.
    pub fn reset(&self) {
        let mut classes = self.classes.lock();
        for class_db in classes.values_mut() {
            class_db.entries.clear();
        }
    }

    pub fn schema_of(&self, class: &str) -> Option<Arc<Schema>> {
        self.classes.lock().get(class).map(|c| Arc::clone(&c.schema))
    }

    /// Turn entry deduplication off for one class: every insert is kept,
    /// even when an equivalent entry exists.
    pub fn set_no_history(&self, class: &str, no_history: bool) {
        if let Some(class_db) = self.classes.lock().get_mut(class) {
            class_db.no_history = no_history;
        }
    }

    /// First definition the object structurally matches.
    pub fn find_matching_class(&self, value: &Value) -> Option<String> {
        find_matching_schema(&self.spec, value).map(|(name, _)| name.to_owned())
    }

    pub fn insert(&self, class: &str, data: Value, associations: Associations) -> Result<()> {
        let mut classes = self.classes.lock();
        let class_db = classes
            .get_mut(class)
            .ok_or_else(|| ProbeError::internal(format!("no shadow collection for '{class}'")))?;
        debug!(class, "inserting entry into shadow store");
        class_db.insert(data, associations);
        Ok(())
    }

    pub fn find(
        &self,
        class: &str,
        criteria: &Value,
        associations: &Associations,
        matcher: Matcher,
        limit: usize,
    ) -> Vec<Value> {
        self.classes
            .lock()
            .get(class)
            .map(|c| c.find(criteria, associations, matcher, limit))
            .unwrap_or_default()
    }

    pub fn delete(
        &self,
        class: &str,
        criteria: &Value,
        associations: &Associations,
        matcher: Matcher,
        limit: usize,
    ) -> usize {
        self.classes
            .lock()
            .get_mut(class)
            .map(|c| c.delete(criteria, associations, matcher, limit))
            .unwrap_or(0)
    }

    pub fn update(
        &self,
        class: &str,
        criteria: &Value,
        associations: &Associations,
        matcher: Matcher,
        new_obj: &JsonMap,
        limit: usize,
        patch: bool,
    ) -> usize {
        self.classes
            .lock()
            .get_mut(class)
            .map(|c| c.update(criteria, associations, matcher, new_obj, limit, patch))
            .unwrap_or(0)
    }

    pub fn entry_count(&self, class: &str) -> usize {
        self.classes.lock().get(class).map(ClassDb::len).unwrap_or(0)
    }
}
