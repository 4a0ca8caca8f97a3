//! The per-executor context: class arena, name cache, indexes, counters

use crate::algorithm::{AlgoId, AlgorithmRegistry, LinearizeFn};
use crate::class::{Class, ClassId, Method, MethodEntry};
use crate::errors::{MroError, MroResult};
use crate::isarev::IsaRev;
use crate::meta::{ClassMeta, Linearization};
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// The implicit ultimate ancestor appended to every class's membership set.
pub const UNIVERSAL: &str = "UNIVERSAL";

/// Everything one logical executor knows about its class universe.
///
/// All shared state lives here and is threaded through operations
/// explicitly; there are no process-wide singletons. A second executor gets
/// its own copy through [`ClassRegistry::clone_for_spawn`].
#[derive(Debug)]
pub struct ClassRegistry {
    pub(crate) classes: Vec<Class>,
    /// Name-to-class lookup cache. Authoritative for resolution: renames
    /// drop old keys here, so stale names stop resolving immediately.
    pub(crate) by_name: HashMap<String, ClassId>,
    /// Top-level namespace table.
    pub(crate) root: IndexMap<String, ClassId>,
    pub(crate) isarev: IsaRev,
    pub(crate) algorithms: AlgorithmRegistry,
    /// Bumped instead of per-class cache generations when a change's scope
    /// is inherently global (anything UNIVERSAL-reaching).
    pub(crate) sub_generation: u64,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            by_name: HashMap::new(),
            root: IndexMap::new(),
            isarev: IsaRev::default(),
            algorithms: AlgorithmRegistry::new(),
            sub_generation: 1,
        }
    }

    // ---- class table -----------------------------------------------------

    /// Look a name up in the class cache.
    pub fn resolve(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn class(&self, class: ClassId) -> &Class {
        &self.classes[class.index()]
    }

    pub(crate) fn class_mut(&mut self, class: ClassId) -> &mut Class {
        &mut self.classes[class.index()]
    }

    /// Fetch a class by (possibly nested) name, creating it and any missing
    /// containers along the way. `"Old::Inner"` lands in the nested table of
    /// `Old`, which is created parentless if absent.
    pub fn ensure_class(&mut self, name: &str) -> ClassId {
        if let Some(id) = self.resolve(name) {
            return id;
        }
        let mut container: Option<ClassId> = None;
        let mut fq = String::new();
        let mut created = None;
        for segment in name.split("::") {
            if !fq.is_empty() {
                fq.push_str("::");
            }
            fq.push_str(segment);
            if let Some(id) = self.resolve(&fq) {
                container = Some(id);
                created = Some(id);
                continue;
            }
            let id = ClassId(self.classes.len() as u32);
            self.classes.push(Class::new(fq.clone()));
            self.by_name.insert(fq.clone(), id);
            match container {
                None => {
                    self.root.insert(segment.to_string(), id);
                }
                Some(c) => {
                    self.classes[c.index()].nested.insert(segment.to_string(), id);
                }
            }
            container = Some(id);
            created = Some(id);
        }
        created.expect("class name with no segments")
    }

    /// Install a parent list without firing the change event. The caller
    /// runs `on_parents_changed` afterwards, exactly once per mutation.
    pub fn set_parents(&mut self, class: ClassId, parents: &[&str]) {
        self.class_mut(class).parents = parents.iter().map(|s| s.to_string()).collect();
    }

    /// Create (or fetch) a class, install its parent list, and run the
    /// parent-change propagation. The common way to grow a hierarchy.
    pub fn define_class(&mut self, name: &str, parents: &[&str]) -> MroResult<ClassId> {
        let id = self.ensure_class(name);
        self.set_parents(id, parents);
        self.on_parents_changed(id)?;
        Ok(id)
    }

    /// Make the class reachable under an additional name.
    pub fn alias_class(&mut self, class: ClassId, name: &str) {
        self.class_mut(class).ename_add(name);
        self.by_name.insert(name.to_string(), class);
    }

    /// Define a method in the class's table and fire the method-change
    /// propagation.
    pub fn define_method(&mut self, class: ClassId, name: &str) -> MroResult<Rc<Method>> {
        let canon = self
            .canonical_name(class)
            .ok_or(MroError::AnonymousClass)?
            .to_string();
        let body = Rc::new(Method {
            fq_name: format!("{}::{}", canon, name),
        });
        self.class_mut(class).methods.insert(
            name.to_string(),
            MethodEntry {
                body: Rc::clone(&body),
                cvgen: 0,
            },
        );
        self.on_method_changed(class)?;
        Ok(body)
    }

    /// Install an inherited dispatch-cache copy of a method. These are
    /// dispatch artifacts, not definitions; next-method resolution skips
    /// them.
    pub fn cache_method(&mut self, class: ClassId, name: &str, body: Rc<Method>) {
        let stamp = self.sub_generation.max(1);
        self.class_mut(class)
            .methods
            .insert(name.to_string(), MethodEntry { body, cvgen: stamp });
    }

    pub fn canonical_name(&self, class: ClassId) -> Option<&str> {
        self.class(class).canonical_name()
    }

    // ---- metadata --------------------------------------------------------

    pub(crate) fn meta(&self, class: ClassId) -> Option<&ClassMeta> {
        self.class(class).meta.as_ref()
    }

    /// The metadata slot, allocated on first touch with the DFS default.
    pub(crate) fn meta_mut(&mut self, class: ClassId) -> &mut ClassMeta {
        let dfs = self.algorithms.dfs();
        self.classes[class.index()]
            .meta
            .get_or_insert_with(|| ClassMeta::new(dfs))
    }

    // ---- algorithms ------------------------------------------------------

    /// Register a custom linearization algorithm under a fresh name.
    pub fn register_algo(&mut self, name: &str, resolve: LinearizeFn) -> MroResult<AlgoId> {
        self.algorithms.register(name, resolve).map(|a| a.id())
    }

    /// Switch the class's current algorithm. Linearizations cached under
    /// other algorithms stay; the isa set and next-method memos belong to
    /// the current algorithm and are dropped, and only the local method
    /// cache generation moves.
    pub fn set_algo(&mut self, class: ClassId, name: &str) -> MroResult<()> {
        let which = self
            .algorithms
            .lookup(name)
            .ok_or_else(|| MroError::UnknownAlgorithm(name.to_string()))?;
        let meta = self.meta_mut(class);
        if !Rc::ptr_eq(&meta.current, &which) {
            meta.current = which;
            meta.isa_set = None;
            meta.cache_gen += 1;
            meta.next_method.clear();
        }
        Ok(())
    }

    pub fn get_algo_name(&self, class: ClassId) -> &str {
        match self.meta(class) {
            Some(meta) => meta.current.name(),
            None => "dfs",
        }
    }

    // ---- linearization queries -------------------------------------------

    /// The class's linearization under its current algorithm, from cache
    /// when valid. Guarantees the result opens with the canonical name and
    /// that the isa set is materialized.
    pub fn get_linear_isa(&mut self, class: ClassId) -> MroResult<Rc<Linearization>> {
        let name = self
            .canonical_name(class)
            .ok_or(MroError::AnonymousClass)?
            .to_string();
        let algo = self.meta_mut(class).current.clone();
        let mut lin = algo.resolve(self, class, 0)?;

        // A custom algorithm may hand back a sequence that does not open
        // with us; the built-in DFS always does, so skip the check there.
        if algo.id() != self.algorithms.dfs().id()
            && lin.names().first().map(String::as_str) != Some(name.as_str())
        {
            let mut names = Vec::with_capacity(lin.len() + 1);
            names.push(name.clone());
            names.extend(lin.names().iter().cloned());
            lin = Linearization::new(names);
        }

        let meta = self.meta_mut(class);
        if meta.isa_set.is_none() {
            // the linearizer did not build it for us, so do it here
            let mut set: HashSet<String> = lin.names().iter().cloned().collect();
            set.insert(name);
            set.insert(UNIVERSAL.to_string());
            meta.isa_set = Some(Rc::new(set));
        }
        Ok(lin)
    }

    /// Linearize under an explicitly named algorithm, without touching the
    /// class's current selection.
    pub fn get_linear_isa_with(
        &mut self,
        class: ClassId,
        algo_name: &str,
    ) -> MroResult<Rc<Linearization>> {
        let algo = self
            .algorithms
            .lookup(algo_name)
            .ok_or_else(|| MroError::UnknownAlgorithm(algo_name.to_string()))?;
        algo.resolve(self, class, 0)
    }

    /// Name-based query. A name with no class behind it yields a
    /// one-element linearization of just that name.
    pub fn linear_isa_of_name(&mut self, name: &str) -> MroResult<Rc<Linearization>> {
        match self.resolve(name) {
            Some(id) => self.get_linear_isa(id),
            None => Ok(Linearization::new(vec![name.to_string()])),
        }
    }

    /// Ancestry membership test, `C.isa(X)`. Forces the isa set into
    /// existence first.
    pub fn isa(&mut self, class: ClassId, ancestor: &str) -> MroResult<bool> {
        self.get_linear_isa(class)?;
        let meta = self.meta(class).expect("metadata vanished after linearization");
        let isa = meta
            .isa_set
            .as_ref()
            .expect("linearization did not materialize an isa set");
        Ok(isa.contains(ancestor))
    }

    // ---- observability ---------------------------------------------------

    /// Known subclasses of a name, in a deterministic order.
    pub fn get_isarev(&self, name: &str) -> Vec<String> {
        let mut subs: Vec<String> = self
            .isarev
            .subclasses(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        subs.sort();
        subs
    }

    /// Whether the name is UNIVERSAL itself or one of UNIVERSAL's own
    /// ancestors, i.e. whether changes under it are globally visible.
    pub fn is_universal(&self, name: &str) -> bool {
        name == UNIVERSAL || self.isarev.contains(name, UNIVERSAL)
    }

    pub fn get_pkg_gen(&mut self, class: ClassId) -> u64 {
        self.meta_mut(class).pkg_gen
    }

    pub fn get_cache_gen(&mut self, class: ClassId) -> u64 {
        self.meta_mut(class).cache_gen
    }

    pub fn sub_generation(&self) -> u64 {
        self.sub_generation
    }

    /// Invalidate every method cache in the process at a stroke.
    pub fn invalidate_all_method_caches(&mut self) {
        self.sub_generation += 1;
        debug!("mro: global method cache invalidation, sub_generation={}", self.sub_generation);
    }

    // ---- executor cloning ------------------------------------------------

    /// Duplicate the universe for a new logical executor. Metadata comes
    /// across with generation counters intact but every cache cold; the
    /// clone rebuilds linearizations and isa sets on first use.
    pub fn clone_for_spawn(&self) -> ClassRegistry {
        ClassRegistry {
            classes: self
                .classes
                .iter()
                .map(|c| Class {
                    names: c.names.clone(),
                    parents: c.parents.clone(),
                    methods: c.methods.clone(),
                    nested: c.nested.clone(),
                    meta: c.meta.as_ref().map(ClassMeta::duplicate),
                })
                .collect(),
            by_name: self.by_name.clone(),
            root: self.root.clone(),
            isarev: self.isarev.clone(),
            algorithms: self.algorithms.clone(),
            sub_generation: self.sub_generation,
        }
    }
}
