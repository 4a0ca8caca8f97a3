//! Class records: names, parent lists, method tables, nested namespaces

use crate::meta::ClassMeta;
use indexmap::IndexMap;
use std::rc::Rc;

/// Arena handle for a class. Stable for the life of the registry; classes are
/// never deallocated, only detached from every name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A resolved method payload. The dispatcher owns the real callable; this
/// subsystem only needs a stable identity to hand back and memoize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub fq_name: String,
}

/// Method-table slot. `cvgen` is zero for a real definition; a nonzero stamp
/// marks a dispatch-cache copy inherited from an ancestor.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub body: Rc<Method>,
    pub cvgen: u64,
}

impl MethodEntry {
    pub fn is_cache_entry(&self) -> bool {
        self.cvgen != 0
    }
}

/// One class in the universe.
///
/// A class is reachable under zero or more effective names; the first is the
/// canonical one used in linearizations. The parent list is ordered and may
/// name classes that do not exist yet. The metadata slot is allocated lazily
/// on the first query that needs it.
#[derive(Debug, Clone)]
pub struct Class {
    pub(crate) names: Vec<String>,
    pub(crate) parents: Vec<String>,
    pub(crate) methods: IndexMap<String, MethodEntry>,
    pub(crate) nested: IndexMap<String, ClassId>,
    pub(crate) meta: Option<ClassMeta>,
}

impl Class {
    pub(crate) fn new(name: String) -> Self {
        Self {
            names: vec![name],
            parents: Vec::new(),
            methods: IndexMap::new(),
            nested: IndexMap::new(),
            meta: None,
        }
    }

    /// The name linearizations open with, if the class has any name at all.
    pub fn canonical_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.get(name)
    }

    /// Nested namespace entries, as `(key, class)` pairs in table order.
    pub fn nested(&self) -> impl Iterator<Item = (&str, ClassId)> {
        self.nested.iter().map(|(k, id)| (k.as_str(), *id))
    }

    pub(crate) fn ename_add(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }

    pub(crate) fn ename_delete(&mut self, name: &str) {
        self.names.retain(|n| n != name);
    }
}
