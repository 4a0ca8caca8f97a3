//! Per-class metadata: cached linearizations, isa membership, generations

use crate::algorithm::{AlgoId, MroAlgorithm};
use crate::class::Method;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A frozen linearization: ancestor names in lookup order, the class itself
/// first. Never mutated once published; invalidation replaces the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linearization {
    names: Vec<String>,
}

impl Linearization {
    /// Freeze a sequence. Custom algorithms build their results with this;
    /// the sequence is immutable from here on.
    pub fn new(names: Vec<String>) -> Rc<Self> {
        Rc::new(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.names.iter()
    }
}

/// Cached linearizations, at most one per algorithm identity.
///
/// Most classes only ever see their current algorithm, so a single inline
/// slot stands in for the table until a second algorithm shows up.
#[derive(Debug, Clone, Default)]
pub(crate) enum LinearCache {
    #[default]
    Empty,
    Single(AlgoId, Rc<Linearization>),
    Table(HashMap<AlgoId, Rc<Linearization>>),
}

impl LinearCache {
    pub(crate) fn get(&self, algo: AlgoId) -> Option<Rc<Linearization>> {
        match self {
            LinearCache::Empty => None,
            LinearCache::Single(id, lin) if *id == algo => Some(Rc::clone(lin)),
            LinearCache::Single(..) => None,
            LinearCache::Table(table) => table.get(&algo).map(Rc::clone),
        }
    }

    pub(crate) fn insert(&mut self, algo: AlgoId, lin: Rc<Linearization>) {
        match self {
            LinearCache::Empty => *self = LinearCache::Single(algo, lin),
            LinearCache::Single(id, _) if *id == algo => {
                *self = LinearCache::Single(algo, lin);
            }
            LinearCache::Single(id, existing) => {
                // second algorithm: promote the inline slot to a table
                let mut table = HashMap::with_capacity(2);
                table.insert(*id, Rc::clone(existing));
                table.insert(algo, lin);
                *self = LinearCache::Table(table);
            }
            LinearCache::Table(table) => {
                table.insert(algo, lin);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = LinearCache::Empty;
    }
}

/// The metadata slot this subsystem owns on every class.
#[derive(Debug, Clone)]
pub struct ClassMeta {
    /// Algorithm consulted by plain linearization queries.
    pub(crate) current: Rc<MroAlgorithm>,
    pub(crate) lins: LinearCache,
    /// Membership cache for `isa` queries; belongs to the current algorithm
    /// and is rebuilt lazily after invalidation.
    pub(crate) isa_set: Option<Rc<HashSet<String>>>,
    /// Memoized next-method lookups keyed by caller fq name; `None` records
    /// a negative hit.
    pub(crate) next_method: HashMap<String, Option<Rc<Method>>>,
    /// Bumped on any change to the class itself (parents or methods).
    pub(crate) pkg_gen: u64,
    /// Bumped when dispatch-relevant ancestry state changes.
    pub(crate) cache_gen: u64,
}

impl ClassMeta {
    pub(crate) fn new(default_algo: Rc<MroAlgorithm>) -> Self {
        Self {
            current: default_algo,
            lins: LinearCache::default(),
            isa_set: None,
            next_method: HashMap::new(),
            pkg_gen: 1,
            cache_gen: 1,
        }
    }

    pub(crate) fn clear_linear(&mut self) {
        self.lins.clear();
    }

    /// Copy for a freshly spawned executor: generation counters carry over,
    /// every cache starts cold and regenerates lazily.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            current: Rc::clone(&self.current),
            lins: LinearCache::default(),
            isa_set: None,
            next_method: HashMap::new(),
            pkg_gen: self.pkg_gen,
            cache_gen: self.cache_gen,
        }
    }
}
