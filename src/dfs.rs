//! Depth-first pre-order linearization

use crate::class::ClassId;
use crate::errors::{MroError, MroResult};
use crate::meta::Linearization;
use crate::registry::{ClassRegistry, UNIVERSAL};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::rc::Rc;

/// Flatten the parent graph depth-first, first occurrence wins. Parent names
/// with no class behind them are kept as bare names. Builds the class's isa
/// set as a side effect and freezes the result into the cache.
pub(crate) fn linearize_dfs(
    registry: &mut ClassRegistry,
    class: ClassId,
    level: u32,
) -> MroResult<Rc<Linearization>> {
    let self_name = registry
        .canonical_name(class)
        .ok_or(MroError::AnonymousClass)?
        .to_string();
    if level > 100 {
        return Err(MroError::RecursiveInheritance(self_name));
    }

    let dfs_id = registry.algorithms.dfs().id();
    if let Some(hit) = registry.meta_mut(class).lins.get(dfs_id) {
        return Ok(hit);
    }

    let parents: SmallVec<[String; 8]> = registry.class(class).parents().iter().cloned().collect();

    let mut retval: Vec<String> = vec![self_name.clone()];
    // Tracks every name already in the result so later parents splice in
    // without duplicates; retained afterwards as the isa membership set.
    let mut stored: HashSet<String> = HashSet::new();
    let mut seen_first = false;

    for parent in &parents {
        let base = registry.resolve(parent);
        if base == Some(class) {
            return Err(MroError::RecursiveInheritance(self_name));
        }
        match base {
            Some(base) => {
                let sub = linearize_dfs(registry, base, level + 1)?;
                if !seen_first {
                    // First parent with a class behind it: our linearization
                    // is ourselves prepended to theirs, and our isa set is
                    // theirs plus our own name.
                    retval.extend(sub.names().iter().cloned());
                    stored = match registry.meta(base).and_then(|m| m.isa_set.as_ref()) {
                        Some(isa) => isa.as_ref().clone(),
                        None => {
                            // isa was dropped independently of the cached
                            // linearization; rebuild equivalent membership
                            let mut set: HashSet<String> =
                                sub.names().iter().cloned().collect();
                            set.insert(UNIVERSAL.to_string());
                            set
                        }
                    };
                } else {
                    for name in sub.names() {
                        if stored.insert(name.clone()) {
                            retval.push(name.clone());
                        }
                    }
                }
            }
            None => {
                // no class for this parent name, keep it as a bare entry
                if !seen_first {
                    stored.insert(UNIVERSAL.to_string());
                }
                if stored.insert(parent.clone()) {
                    retval.push(parent.clone());
                }
            }
        }
        seen_first = true;
    }

    if !seen_first {
        stored.insert(UNIVERSAL.to_string());
    }
    stored.insert(self_name);

    let lin = Linearization::new(retval);
    let meta = registry.meta_mut(class);
    meta.isa_set = Some(Rc::new(stored));
    meta.lins.insert(dfs_id, Rc::clone(&lin));
    Ok(lin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(lin: &Linearization) -> Vec<&str> {
        lin.names().iter().map(String::as_str).collect()
    }

    #[test]
    fn test_parentless_class() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &[]).unwrap();
        let lin = reg.get_linear_isa(a).unwrap();
        assert_eq!(names(&lin), ["A"]);
        assert!(reg.isa(a, "UNIVERSAL").unwrap());
        assert!(reg.isa(a, "A").unwrap());
    }

    #[test]
    fn test_single_parent_chain() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        reg.define_class("B", &["A"]).unwrap();
        let c = reg.define_class("C", &["B"]).unwrap();
        let lin = reg.get_linear_isa(c).unwrap();
        assert_eq!(names(&lin), ["C", "B", "A"]);
        assert!(reg.isa(c, "A").unwrap());
        assert!(!reg.isa(c, "D").unwrap());
    }

    #[test]
    fn test_dangling_parent_kept_as_bare_name() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &["Nonexistent"]).unwrap();
        let lin = reg.get_linear_isa(a).unwrap();
        assert_eq!(names(&lin), ["A", "Nonexistent"]);
        assert!(reg.isa(a, "Nonexistent").unwrap());
        assert!(reg.isa(a, "UNIVERSAL").unwrap());
    }

    #[test]
    fn test_duplicate_parents_collapse() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A", "A", "Ghost", "Ghost"]).unwrap();
        let lin = reg.get_linear_isa(b).unwrap();
        assert_eq!(names(&lin), ["B", "A", "Ghost"]);
    }

    #[test]
    fn test_cache_hit_returns_same_sequence() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        let first = reg.get_linear_isa(b).unwrap();
        let second = reg.get_linear_isa(b).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_self_parent_is_recursive_inheritance() {
        let mut reg = ClassRegistry::new();
        let a = reg.ensure_class("A");
        reg.set_parents(a, &["A"]);
        assert_eq!(
            reg.get_linear_isa(a),
            Err(MroError::RecursiveInheritance("A".to_string()))
        );
    }

    #[test]
    fn test_inheritance_cycle_hits_depth_ceiling() {
        let mut reg = ClassRegistry::new();
        let a = reg.ensure_class("A");
        let b = reg.ensure_class("B");
        reg.set_parents(a, &["B"]);
        reg.set_parents(b, &["A"]);
        assert!(matches!(
            reg.get_linear_isa(a),
            Err(MroError::RecursiveInheritance(_))
        ));
    }

    #[test]
    fn test_anonymous_class_rejected() {
        let mut reg = ClassRegistry::new();
        let a = reg.ensure_class("A");
        reg.class_mut(a).ename_delete("A");
        assert_eq!(reg.get_linear_isa(a), Err(MroError::AnonymousClass));
    }
}
