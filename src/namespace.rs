//! Namespace moves: renaming whole subtrees and keeping caches coherent

use crate::class::ClassId;
use crate::errors::{MroError, MroResult};
use crate::registry::ClassRegistry;
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// The namespace spot a class was assigned into (or removed from): a
/// containing class (`None` for the top level) and the key inside its
/// table. The spot's effective names are derived from the container's
/// names, one per name when the container is multiply named.
#[derive(Debug, Clone)]
pub struct Slot {
    pub container: Option<ClassId>,
    pub key: String,
}

impl Slot {
    pub fn top_level(key: &str) -> Self {
        Self {
            container: None,
            key: key.to_string(),
        }
    }

    pub fn nested(container: ClassId, key: &str) -> Self {
        Self {
            container: Some(container),
            key: key.to_string(),
        }
    }
}

/// Which side(s) of the assignment a class has been walked from. A class
/// can sit in both subtrees; it is processed once per side so both
/// renamings land, and never twice for the same side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seen {
    Old,
    New,
    Both,
}

/// Per-class record taken while gathering: the names it carried before the
/// move and its pre-move isa set.
type Gathered = IndexMap<ClassId, (Vec<String>, Option<Rc<HashSet<String>>>)>;

impl ClassRegistry {
    /// Mutate a namespace table directly, returning the previous occupant.
    /// This is the raw slot assignment; callers follow up with
    /// [`ClassRegistry::on_class_moved`] to restore coherence.
    pub fn assign_slot(&mut self, slot: &Slot, class: Option<ClassId>) -> Option<ClassId> {
        let table = match slot.container {
            None => &mut self.root,
            Some(c) => &mut self.classes[c.index()].nested,
        };
        match class {
            Some(id) => table.insert(slot.key.clone(), id),
            None => table.shift_remove(&slot.key),
        }
    }

    /// React to a class (and everything nested under it) having been
    /// assigned into `slot`, possibly replacing `old_class`, possibly
    /// deleting it (`class` is `None`).
    ///
    /// Every affected class in both subtrees is renamed first, and the
    /// global name cache cleared of the old names, before any cache
    /// propagation runs: a subclass relinearized against a half-renamed
    /// ancestry would cache the ancestor's stale name. Affected classes
    /// that keep a name then go through the parent-change propagation with
    /// their pre-move isa sets restored; classes deleted outright are
    /// scrubbed from the rev-index instead.
    ///
    /// Unless bit 0 of `flags` is set, the slot is first checked to still
    /// hold the claimed class; a stale notification is ignored.
    pub fn on_class_moved(
        &mut self,
        class: Option<ClassId>,
        old_class: Option<ClassId>,
        slot: &Slot,
        flags: u32,
    ) -> MroResult<()> {
        if flags & 1 == 0 {
            let occupant = match slot.container {
                None => self.root.get(&slot.key).copied(),
                Some(c) => self.class(c).nested.get(&slot.key).copied(),
            };
            if occupant != class {
                return Ok(());
            }
        }

        let names = self.slot_names(slot);
        if names.is_empty() {
            return Ok(());
        }
        debug!("mro: class moved, slot names {:?}", names);

        let mut gathered: Gathered = IndexMap::new();
        let mut seen: HashMap<ClassId, Seen> = HashMap::new();
        self.gather_and_rename(&mut gathered, &mut seen, class, old_class, &names);

        // Renaming is complete everywhere; only now is it safe to let any
        // class relinearize.
        let mut first_err: Option<MroError> = None;
        for (id, (old_names, old_isa)) in gathered {
            if self.class(id).names().is_empty() {
                // deleted outright: nothing to relinearize, but its old
                // ancestry must not keep naming it
                if let Some(isa) = &old_isa {
                    for old_name in &old_names {
                        self.isarev.remove_except(isa, old_name, None);
                    }
                }
                continue;
            }
            self.restore_isa_set(id, old_isa);
            if let Err(e) = self.on_parents_changed(id) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The effective name(s) of a slot: the key alone at the top level,
    /// otherwise one `container::key` per effective name of the container.
    fn slot_names(&self, slot: &Slot) -> Vec<String> {
        match slot.container {
            None => vec![slot.key.clone()],
            Some(c) => self
                .class(c)
                .names()
                .iter()
                .map(|n| format!("{}::{}", n, slot.key))
                .collect(),
        }
    }

    /// Walk both subtrees under the assigned slot, renaming every class,
    /// recording pre-move state, clearing linearization caches, and pulling
    /// in the subclasses of every name that stops resolving.
    fn gather_and_rename(
        &mut self,
        gathered: &mut Gathered,
        seen: &mut HashMap<ClassId, Seen>,
        class: Option<ClassId>,
        old_class: Option<ClassId>,
        names: &[String],
    ) {
        let class_had_name = class.map_or(false, |s| !self.class(s).names().is_empty());
        let mut sub_sources: Vec<HashSet<String>> = Vec::new();
        let mut fetched_subs = false;

        let mut old_active = old_class;
        if let Some(old) = old_active {
            let prev = seen.get(&old).copied();
            match prev {
                Some(Seen::Old) | Some(Seen::Both) => {
                    old_active = None;
                }
                _ => {
                    let state = if prev == Some(Seen::New) {
                        Seen::Both
                    } else {
                        Seen::Old
                    };
                    seen.insert(old, state);

                    let old_names = self.class(old).names().to_vec();
                    let old_isa = self.meta(old).and_then(|m| m.isa_set.clone());
                    gathered
                        .entry(old)
                        .or_insert((old_names.clone(), old_isa.clone()));
                    self.meta_mut(old).clear_linear();

                    // drop the assigned names from the class and from the
                    // global name cache
                    let mut deleted: Vec<String> = Vec::new();
                    for name in names {
                        if old_names.iter().any(|n| n == name) {
                            if self.resolve(name) == Some(old) {
                                self.by_name.remove(name);
                            }
                            self.class_mut(old).ename_delete(name);
                            deleted.push(name.clone());
                        }
                    }
                    if !deleted.is_empty() {
                        // Names that stopped resolving will not go through
                        // the parent-change propagation under their old
                        // spelling, so their rev-index bookkeeping happens
                        // here: scrub them from their ancestors' entries and
                        // detach their subclass lists for gathering.
                        for name in &deleted {
                            if let Some(isa) = &old_isa {
                                self.isarev.remove_except(isa, name, None);
                            }
                            if let Some(set) = self.isarev.remove_entry(name) {
                                sub_sources.push(set);
                            }
                        }
                        fetched_subs = true;
                    }
                }
            }
        }

        let mut new_active = class;
        if let Some(s) = new_active {
            // the new names apply even if the class was walked before;
            // different paths contribute different names
            for name in names {
                self.class_mut(s).ename_add(name);
                self.by_name.insert(name.clone(), s);
            }
            let prev = seen.get(&s).copied();
            match prev {
                Some(Seen::New) | Some(Seen::Both) => {
                    new_active = None;
                }
                _ => {
                    let state = if prev == Some(Seen::Old) {
                        Seen::Both
                    } else {
                        Seen::New
                    };
                    seen.insert(s, state);
                    if !class_had_name {
                        // Detached before this assignment: its caches were
                        // built under no name at all and must go.
                        let old_names = self.class(s).names().to_vec();
                        let old_isa = self.meta(s).and_then(|m| m.isa_set.clone());
                        gathered.entry(s).or_insert((old_names, old_isa));
                        self.meta_mut(s).clear_linear();
                    }
                }
            }
        }

        if new_active.is_none() && old_active.is_none() {
            // both sides already walked
            return;
        }

        // Gather the subclasses of every affected name: they relinearize
        // once the renaming settles. When nothing was deleted, subclasses
        // may be listed under any of the slot names (a previously dangling
        // name can start resolving through this assignment).
        if !fetched_subs {
            if let Some(old) = old_active {
                if let Some(ename) = self.class(old).canonical_name() {
                    if let Some(set) = self.isarev.subclasses(ename) {
                        sub_sources.push(set.clone());
                    }
                    fetched_subs = true;
                }
            }
            if !fetched_subs {
                for name in names {
                    if let Some(set) = self.isarev.subclasses(name) {
                        sub_sources.push(set.clone());
                    }
                }
            }
        }
        for source in sub_sources {
            let mut subs: Vec<String> = source.into_iter().collect();
            subs.sort();
            for sub in subs {
                let id = match self.resolve(&sub) {
                    Some(id) => id,
                    None => continue,
                };
                let sub_names = self.class(id).names().to_vec();
                let sub_isa = self.meta(id).and_then(|m| m.isa_set.clone());
                gathered.entry(id).or_insert((sub_names, sub_isa));
                self.meta_mut(id).clear_linear();
            }
        }

        // Recurse through the old subtree, pairing each nested entry with
        // its counterpart (same key) in the new subtree.
        let mut walked_keys: HashSet<String> = HashSet::new();
        if let Some(old) = old_active {
            let entries: Vec<(String, ClassId)> = self
                .class(old)
                .nested()
                .map(|(k, id)| (k.to_string(), id))
                .collect();
            for (key, old_sub) in entries {
                if old_sub == old {
                    // self-referential namespace entry, do not chase it
                    continue;
                }
                let new_sub = new_active.and_then(|s| self.class(s).nested.get(&key).copied());
                let old_sub_named = !self.class(old_sub).names().is_empty();
                if new_sub.is_some() || old_sub_named {
                    let sub_names = append_key(names, &key);
                    self.gather_and_rename(gathered, seen, new_sub, Some(old_sub), &sub_names);
                }
                walked_keys.insert(key);
            }
        }

        // Entries only present on the new side.
        if let Some(s) = new_active {
            let entries: Vec<(String, ClassId)> = self
                .class(s)
                .nested()
                .map(|(k, id)| (k.to_string(), id))
                .collect();
            for (key, new_sub) in entries {
                if walked_keys.contains(&key) {
                    continue;
                }
                if new_sub == s {
                    continue;
                }
                let sub_names = append_key(names, &key);
                self.gather_and_rename(gathered, seen, Some(new_sub), None, &sub_names);
            }
        }
    }
}

fn append_key(names: &[String], key: &str) -> Vec<String> {
    names
        .iter()
        .map(|n| format!("{}::{}", n, key))
        .collect()
}
