//! Pluggable linearization algorithms and their registry

use crate::class::ClassId;
use crate::errors::{MroError, MroResult};
use crate::meta::Linearization;
use crate::registry::ClassRegistry;
use std::collections::HashMap;
use std::rc::Rc;

/// Identity token for a registered algorithm, distinct from its name and
/// usable as a cache key. Registration is one-shot per name, so tokens never
/// need to survive a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgoId(u32);

/// Signature every linearizer implements. `level` starts at 0 and tracks
/// recursion depth for the inheritance ceiling.
pub type LinearizeFn = fn(&mut ClassRegistry, ClassId, u32) -> MroResult<Rc<Linearization>>;

/// Descriptor for one algorithm. Descriptors live for the life of the
/// registry and are shared by handle.
#[derive(Debug)]
pub struct MroAlgorithm {
    name: String,
    id: AlgoId,
    resolve: LinearizeFn,
}

impl MroAlgorithm {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> AlgoId {
        self.id
    }

    pub(crate) fn resolve(
        &self,
        registry: &mut ClassRegistry,
        class: ClassId,
        level: u32,
    ) -> MroResult<Rc<Linearization>> {
        (self.resolve)(registry, class, level)
    }
}

/// Name-keyed table of algorithm descriptors. Construction installs the two
/// built-in linearizers; anything else arrives through `register`.
#[derive(Debug, Clone)]
pub struct AlgorithmRegistry {
    by_name: HashMap<String, Rc<MroAlgorithm>>,
    next_id: u32,
    dfs: Rc<MroAlgorithm>,
    c3: Rc<MroAlgorithm>,
}

impl AlgorithmRegistry {
    pub(crate) fn new() -> Self {
        let dfs = Rc::new(MroAlgorithm {
            name: "dfs".to_string(),
            id: AlgoId(0),
            resolve: crate::dfs::linearize_dfs,
        });
        let c3 = Rc::new(MroAlgorithm {
            name: "c3".to_string(),
            id: AlgoId(1),
            resolve: crate::c3::linearize_c3,
        });
        let mut by_name = HashMap::new();
        by_name.insert("dfs".to_string(), Rc::clone(&dfs));
        by_name.insert("c3".to_string(), Rc::clone(&c3));
        Self {
            by_name,
            next_id: 2,
            dfs,
            c3,
        }
    }

    /// Register a custom linearizer. Fails if the name is taken; there is no
    /// replacement, callers pick a fresh name instead.
    pub fn register(&mut self, name: &str, resolve: LinearizeFn) -> MroResult<Rc<MroAlgorithm>> {
        if self.by_name.contains_key(name) {
            return Err(MroError::DuplicateAlgorithm(name.to_string()));
        }
        let algo = Rc::new(MroAlgorithm {
            name: name.to_string(),
            id: AlgoId(self.next_id),
            resolve,
        });
        self.next_id += 1;
        self.by_name.insert(name.to_string(), Rc::clone(&algo));
        Ok(algo)
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<MroAlgorithm>> {
        self.by_name.get(name).map(Rc::clone)
    }

    /// The depth-first linearizer, the default for fresh metadata.
    pub fn dfs(&self) -> Rc<MroAlgorithm> {
        Rc::clone(&self.dfs)
    }

    pub fn c3(&self) -> Rc<MroAlgorithm> {
        Rc::clone(&self.c3)
    }
}
