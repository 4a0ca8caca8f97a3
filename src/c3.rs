//! C3 merge linearization

use crate::class::ClassId;
use crate::errors::{MroError, MroResult};
use crate::meta::Linearization;
use crate::registry::ClassRegistry;
use smallvec::{smallvec, SmallVec};
use std::collections::HashMap;
use std::rc::Rc;

/// Compute the C3 linearization: merge the parents' linearizations and the
/// parent list itself, repeatedly taking the first head that appears in no
/// tail. Fails when no head qualifies, carrying the partial merge and the
/// first blocked head; nothing is cached on failure. Unlike the DFS walk
/// this does not build the isa set, the membership query materializes it
/// from the finished sequence instead.
pub(crate) fn linearize_c3(
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

    let c3_id = registry.algorithms.c3().id();
    if let Some(hit) = registry.meta_mut(class).lins.get(c3_id) {
        return Ok(hit);
    }

    let parents: SmallVec<[String; 8]> = registry.class(class).parents().iter().cloned().collect();

    if parents.is_empty() {
        let lin = Linearization::new(vec![self_name]);
        registry.meta_mut(class).lins.insert(c3_id, Rc::clone(&lin));
        return Ok(lin);
    }

    // The sequences to merge: each parent's linearization, then the parent
    // list itself as the local-order tie-breaker.
    let mut seqs: Vec<Vec<String>> = Vec::with_capacity(parents.len() + 1);
    for (i, parent) in parents.iter().enumerate() {
        match registry.resolve(parent) {
            None => {
                // no class behind the name: a fake one-element sequence
                seqs.push(vec![parent.clone()]);
            }
            Some(base) if base == class => {
                return Err(MroError::RecursiveInheritance(self_name));
            }
            Some(base) => {
                let sub = linearize_c3(registry, base, level + 1)?;
                if i == parents.len() - 1 && seqs.is_empty() {
                    // Only one parent and it resolves: the merge degenerates
                    // to ourselves followed by the parent's linearization.
                    let mut names = Vec::with_capacity(sub.len() + 1);
                    names.push(self_name);
                    names.extend(sub.names().iter().cloned());
                    let lin = Linearization::new(names);
                    registry.meta_mut(class).lins.insert(c3_id, Rc::clone(&lin));
                    return Ok(lin);
                }
                seqs.push(sub.names().to_vec());
            }
        }
    }
    seqs.push(parents.into_vec());

    // Head cursors per sequence, and how often each name still occurs in a
    // tail. A head qualifies for the merge exactly when its tail count is
    // zero.
    let mut heads: SmallVec<[usize; 8]> = smallvec![0; seqs.len()];
    let mut tails: HashMap<String, usize> = HashMap::new();
    for seq in &seqs {
        for name in &seq[1..] {
            *tails.entry(name.clone()).or_insert(0) += 1;
        }
    }

    let mut retval: Vec<String> = vec![self_name.clone()];
    loop {
        let mut saw_head = false;
        let mut blocked: Option<String> = None;
        let mut winner: Option<String> = None;

        for s in 0..seqs.len() {
            if heads[s] >= seqs[s].len() {
                continue;
            }
            if winner.is_none() {
                saw_head = true;
                let head = &seqs[s][heads[s]];
                if tails.get(head.as_str()).map_or(false, |n| *n > 0) {
                    // still owed to somebody's tail, try the next sequence
                    if blocked.is_none() {
                        blocked = Some(head.clone());
                    }
                    continue;
                }
                winner = Some(head.clone());
                retval.push(head.clone());
            }
            if winner.as_deref() == Some(seqs[s][heads[s]].as_str()) {
                // advance past the winner; its successor stops being a tail
                heads[s] += 1;
                if heads[s] < seqs[s].len() {
                    if let Some(n) = tails.get_mut(seqs[s][heads[s]].as_str()) {
                        *n -= 1;
                    }
                }
            }
        }

        if !saw_head {
            break;
        }
        if winner.is_none() {
            return Err(MroError::C3Inconsistency {
                class: self_name,
                partial: retval,
                blocked: blocked.unwrap_or_default(),
            });
        }
    }

    let lin = Linearization::new(retval);
    registry.meta_mut(class).lins.insert(c3_id, Rc::clone(&lin));
    Ok(lin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(lin: &Linearization) -> Vec<&str> {
        lin.names().iter().map(String::as_str).collect()
    }

    fn c3(reg: &mut ClassRegistry, name: &str) -> MroResult<Vec<String>> {
        let id = reg.resolve(name).unwrap();
        reg.get_linear_isa_with(id, "c3")
            .map(|lin| lin.names().to_vec())
    }

    #[test]
    fn test_simple_inheritance() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        reg.define_class("B", &["A"]).unwrap();
        assert_eq!(c3(&mut reg, "B").unwrap(), ["B", "A"]);
    }

    #[test]
    fn test_multiple_inheritance() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        reg.define_class("B", &[]).unwrap();
        reg.define_class("C", &["A", "B"]).unwrap();
        assert_eq!(c3(&mut reg, "C").unwrap(), ["C", "A", "B"]);
    }

    #[test]
    fn test_diamond_inheritance() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        reg.define_class("B", &["A"]).unwrap();
        reg.define_class("C", &["A"]).unwrap();
        reg.define_class("D", &["B", "C"]).unwrap();
        assert_eq!(c3(&mut reg, "D").unwrap(), ["D", "B", "C", "A"]);
    }

    #[test]
    fn test_inconsistent_hierarchy() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        reg.define_class("B", &[]).unwrap();
        reg.define_class("X", &["A", "B"]).unwrap();
        reg.define_class("Y", &["B", "A"]).unwrap();
        reg.define_class("Z", &["X", "Y"]).unwrap();
        let err = c3(&mut reg, "Z").unwrap_err();
        assert!(matches!(err, MroError::C3Inconsistency { .. }));
    }

    #[test]
    fn test_dangling_parents_merge_as_leaves() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &["X", "Y"]).unwrap();
        let lin = reg.get_linear_isa_with(a, "c3").unwrap();
        assert_eq!(names(&lin), ["A", "X", "Y"]);
    }

    #[test]
    fn test_failure_carries_partial_and_first_blocked_head() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &["X", "Y"]).unwrap();
        reg.define_class("B", &["Y", "X"]).unwrap();
        let c = reg.define_class("C", &["A", "B"]).unwrap();
        match reg.get_linear_isa_with(c, "c3") {
            Err(MroError::C3Inconsistency {
                class,
                partial,
                blocked,
            }) => {
                assert_eq!(class, "C");
                assert_eq!(partial, ["C", "A", "B"]);
                assert_eq!(blocked, "X");
            }
            other => panic!("expected C3 inconsistency, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_caches_nothing() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &["X", "Y"]).unwrap();
        reg.define_class("B", &["Y", "X"]).unwrap();
        let c = reg.define_class("C", &["A", "B"]).unwrap();
        assert!(reg.get_linear_isa_with(c, "c3").is_err());
        // repairing the hierarchy makes the next query succeed
        reg.set_parents(c, &["A"]);
        reg.on_parents_changed(c).unwrap();
        assert_eq!(c3(&mut reg, "C").unwrap(), ["C", "A", "X", "Y"]);
    }

    #[test]
    fn test_single_parent_fast_path_caches() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        let first = reg.get_linear_isa_with(b, "c3").unwrap();
        let second = reg.get_linear_isa_with(b, "c3").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_self_parent_is_recursive_inheritance() {
        let mut reg = ClassRegistry::new();
        let a = reg.ensure_class("A");
        reg.set_parents(a, &["A"]);
        assert_eq!(
            reg.get_linear_isa_with(a, "c3"),
            Err(MroError::RecursiveInheritance("A".to_string()))
        );
    }
}
