//! Invalidation propagators for parent-list and method-table changes

use crate::class::ClassId;
use crate::errors::{MroError, MroResult};
use crate::registry::{ClassRegistry, UNIVERSAL};
use log::debug;
use std::collections::HashSet;
use std::rc::Rc;

impl ClassRegistry {
    /// React to a change of the class's parent list (the caller has already
    /// mutated it): drop every cache the change can invalidate, on this
    /// class and on every known transitive subclass, then rebuild the
    /// reverse-subclass index from fresh linearizations.
    ///
    /// Subclass caches are cleared in one pass and rebuilt in a second.
    /// Relinearizing a subclass while a sibling still holds its old caches
    /// would let the rebuild observe stale parent state, so no rebuild
    /// starts until every affected cache is gone.
    ///
    /// A subclass whose new hierarchy fails to linearize does not stop the
    /// pass; every subclass is processed, failed ones are conservatively
    /// scrubbed from their former ancestors' entries, and the first error
    /// is returned at the end.
    pub fn on_parents_changed(&mut self, class: ClassId) -> MroResult<()> {
        let class_names = self.class(class).names().to_vec();
        let name = class_names
            .first()
            .cloned()
            .ok_or(MroError::AnonymousClass)?;
        debug!("mro: parent list changed for '{}'", name);

        // wipe our own linearizations; the isa set is set aside, the
        // rev-index delta at the end needs the pre-change ancestry
        let meta = self.meta_mut(class);
        meta.clear_linear();
        let old_isa = meta.isa_set.take();
        meta.pkg_gen += 1;

        // a change to UNIVERSAL, or to an ancestor of it, is visible from
        // every class: one global bump replaces the per-class ones
        let global = class_names.iter().any(|n| n == UNIVERSAL)
            || self.isarev.contains(&name, UNIVERSAL);
        if global {
            self.sub_generation += 1;
        } else {
            self.meta_mut(class).cache_gen += 1;
        }
        self.meta_mut(class).next_method.clear();

        let old_subs = self.sorted_subclasses(&name);

        // Pass A: clear every subclass's caches, setting each old isa set
        // aside for the delta computation in pass B.
        let mut stashed: Vec<(ClassId, String, Option<Rc<HashSet<String>>>)> = Vec::new();
        let mut seen: HashSet<ClassId> = HashSet::new();
        for sub in &old_subs {
            let id = match self.resolve(sub) {
                Some(id) => id,
                None => continue,
            };
            if !seen.insert(id) {
                continue;
            }
            let sub_name = match self.canonical_name(id) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let sub_meta = self.meta_mut(id);
            sub_meta.clear_linear();
            let sub_isa = sub_meta.isa_set.take();
            sub_meta.next_method.clear();
            if !global {
                sub_meta.cache_gen += 1;
            }
            stashed.push((id, sub_name, sub_isa));
        }

        // Pass B: relinearize each subclass and rewrite its rev-index
        // entries, keeping ancestors that survived the change.
        let mut first_err: Option<MroError> = None;
        for (id, sub_name, sub_old_isa) in stashed {
            if let Err(e) = self.rebuild_isarev_entries(id, &sub_name, sub_old_isa.as_deref()) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        // finally ourselves
        if let Err(e) = self.rebuild_isarev_entries(class, &name, old_isa.as_deref()) {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// React to a method-table edit: generations only. Linearizations are
    /// untouched (ancestry did not change), and the class's own cache
    /// generation stays put, the editor already knows about its own change.
    pub fn on_method_changed(&mut self, class: ClassId) -> MroResult<()> {
        let class_names = self.class(class).names().to_vec();
        let name = class_names
            .first()
            .cloned()
            .ok_or(MroError::AnonymousClass)?;
        debug!("mro: method table changed in '{}'", name);

        self.meta_mut(class).pkg_gen += 1;

        if class_names.iter().any(|n| n == UNIVERSAL) || self.isarev.contains(&name, UNIVERSAL) {
            self.sub_generation += 1;
            return Ok(());
        }

        let mut seen: HashSet<ClassId> = HashSet::new();
        for sub in self.sorted_subclasses(&name) {
            let id = match self.resolve(&sub) {
                Some(id) => id,
                None => continue,
            };
            if !seen.insert(id) {
                continue;
            }
            let sub_meta = self.meta_mut(id);
            sub_meta.cache_gen += 1;
            sub_meta.next_method.clear();
        }
        Ok(())
    }

    /// Relinearize one class and bring the rev-index in line with its fresh
    /// ancestry: insert it under every new ancestor, then scrub it from old
    /// ancestors that did not survive. On linearization failure the class is
    /// scrubbed from all of its old ancestors, its new ancestry being
    /// unknowable.
    fn rebuild_isarev_entries(
        &mut self,
        class: ClassId,
        child: &str,
        old_isa: Option<&HashSet<String>>,
    ) -> MroResult<()> {
        match self.get_linear_isa(class) {
            Ok(_) => {
                let new_isa = self
                    .meta(class)
                    .and_then(|m| m.isa_set.clone())
                    .expect("linearization did not materialize an isa set");
                let own_names = self.class(class).names().to_vec();
                for ancestor in new_isa.iter() {
                    if own_names.iter().any(|n| n == ancestor) {
                        continue;
                    }
                    self.isarev.add(ancestor, child);
                }
                if let Some(old) = old_isa {
                    self.isarev.remove_except(old, child, Some(new_isa.as_ref()));
                }
                Ok(())
            }
            Err(e) => {
                if let Some(old) = old_isa {
                    self.isarev.remove_except(old, child, None);
                }
                Err(e)
            }
        }
    }

    /// Snapshot of a name's known subclasses in a deterministic order.
    pub(crate) fn sorted_subclasses(&self, name: &str) -> Vec<String> {
        let mut subs: Vec<String> = self
            .isarev
            .subclasses(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        subs.sort();
        subs
    }

    /// Restore a previously stashed isa set; the namespace-move propagator
    /// uses this so that delta computation runs against genuine pre-event
    /// state even when an earlier propagation already rebuilt the slot.
    pub(crate) fn restore_isa_set(&mut self, class: ClassId, isa: Option<Rc<HashSet<String>>>) {
        self.meta_mut(class).isa_set = isa;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_change_rewrites_rev_index() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        reg.define_class("B", &["A"]).unwrap();
        reg.define_class("C", &["A"]).unwrap();
        let d = reg.define_class("D", &["B", "C"]).unwrap();

        assert_eq!(reg.get_isarev("A"), ["B", "C", "D"]);
        assert_eq!(reg.get_isarev("B"), ["D"]);
        assert_eq!(reg.get_isarev("C"), ["D"]);

        reg.set_parents(d, &["B"]);
        reg.on_parents_changed(d).unwrap();

        assert_eq!(reg.get_isarev("C"), Vec::<String>::new());
        assert_eq!(reg.get_isarev("B"), ["D"]);
        let lin = reg.get_linear_isa(d).unwrap();
        assert_eq!(lin.names(), &["D".to_string(), "B".to_string(), "A".to_string()]);
    }

    #[test]
    fn test_parent_change_reaches_transitive_subclasses() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &[]).unwrap();
        reg.define_class("B", &["A"]).unwrap();
        let c = reg.define_class("C", &["B"]).unwrap();

        let before = reg.get_cache_gen(c);
        let lin_before = reg.get_linear_isa(c).unwrap();
        assert_eq!(lin_before.names().len(), 3);

        reg.define_class("Root", &[]).unwrap();
        reg.set_parents(a, &["Root"]);
        reg.on_parents_changed(a).unwrap();

        assert!(reg.get_cache_gen(c) > before);
        let lin_after = reg.get_linear_isa(c).unwrap();
        assert_eq!(
            lin_after.names(),
            &[
                "C".to_string(),
                "B".to_string(),
                "A".to_string(),
                "Root".to_string()
            ]
        );
        assert_eq!(reg.get_isarev("Root"), ["A", "B", "C"]);
    }

    #[test]
    fn test_method_change_bumps_subclasses_only() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        let t = reg.define_class("T", &[]).unwrap();

        let a_cache = reg.get_cache_gen(a);
        let a_pkg = reg.get_pkg_gen(a);
        let b_cache = reg.get_cache_gen(b);
        let t_cache = reg.get_cache_gen(t);

        reg.on_method_changed(a).unwrap();

        assert_eq!(reg.get_pkg_gen(a), a_pkg + 1);
        assert_eq!(reg.get_cache_gen(a), a_cache, "own cache generation stays");
        assert_eq!(reg.get_cache_gen(b), b_cache + 1);
        assert_eq!(reg.get_cache_gen(t), t_cache, "unrelated class untouched");
    }

    #[test]
    fn test_universal_scope_bumps_global_generation() {
        let mut reg = ClassRegistry::new();
        let u = reg.define_class("UNIVERSAL", &[]).unwrap();
        let sub = reg.define_class("Sub", &[]).unwrap();
        let sub_cache = reg.get_cache_gen(sub);
        let global = reg.sub_generation();

        reg.on_method_changed(u).unwrap();
        assert_eq!(reg.sub_generation(), global + 1);
        assert_eq!(reg.get_cache_gen(sub), sub_cache);

        reg.on_parents_changed(u).unwrap();
        assert_eq!(reg.sub_generation(), global + 2);
    }

    #[test]
    fn test_universal_ancestor_is_global_scope() {
        let mut reg = ClassRegistry::new();
        let base = reg.define_class("Base", &[]).unwrap();
        reg.define_class("UNIVERSAL", &["Base"]).unwrap();
        assert!(reg.is_universal("Base"));
        assert!(reg.is_universal("UNIVERSAL"));
        assert!(!reg.is_universal("Nothing"));

        let global = reg.sub_generation();
        reg.on_method_changed(base).unwrap();
        assert_eq!(reg.sub_generation(), global + 1);
    }

    #[test]
    fn test_failed_subclass_does_not_stop_the_pass() {
        let mut reg = ClassRegistry::new();
        reg.define_class("X", &[]).unwrap();
        reg.define_class("Y", &[]).unwrap();
        reg.define_class("A", &["X", "Y"]).unwrap();
        let b = reg.define_class("B", &["X", "Y"]).unwrap();
        let c = reg.define_class("C", &["A", "B"]).unwrap();
        let d = reg.define_class("D", &["B"]).unwrap();
        reg.set_algo(c, "c3").unwrap();
        reg.get_linear_isa(c).unwrap();

        // flipping B's parent order makes C's C3 merge impossible
        reg.set_parents(b, &["Y", "X"]);
        let err = reg.on_parents_changed(b).unwrap_err();
        assert!(matches!(err, MroError::C3Inconsistency { .. }));

        // the sibling subclass after the failed one was still rebuilt
        let lin = reg.get_linear_isa(d).unwrap();
        assert_eq!(
            lin.names(),
            &[
                "D".to_string(),
                "B".to_string(),
                "Y".to_string(),
                "X".to_string()
            ]
        );
        // and the failed class keeps failing until repaired
        assert!(reg.get_linear_isa(c).is_err());
    }
}
