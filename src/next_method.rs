//! Next-method resolution: the implementation after the caller's own

use crate::c3;
use crate::class::{ClassId, Method};
use crate::errors::{MroError, MroResult};
use crate::registry::ClassRegistry;
use log::warn;
use std::rc::Rc;

impl ClassRegistry {
    /// Find the method that would run after the caller's own definition:
    /// walk the invocant's linearization past the caller's defining class
    /// and return the first real definition of the same method name.
    ///
    /// `caller_fq_name` is the caller's fully qualified name,
    /// `"Some::Class::method"`. Resolution always follows C3 order, whatever
    /// the invocant's current algorithm; a parent's dispatch-cache entries
    /// are not valid definitions here and are skipped. Results, including
    /// misses, are memoized per invocant until the next invalidation.
    ///
    /// With `throw` set a miss is an error; otherwise it is an empty result.
    pub fn next_method(
        &mut self,
        invocant: ClassId,
        caller_fq_name: &str,
        throw: bool,
    ) -> MroResult<Option<Rc<Method>>> {
        let self_name = self
            .canonical_name(invocant)
            .ok_or(MroError::AnonymousClass)?
            .to_string();

        let (caller_pkg, method_name) = match caller_fq_name.rsplit_once("::") {
            Some(split) => split,
            None => {
                // not a fully qualified caller, nothing to walk past
                return miss(&self_name, caller_fq_name, throw);
            }
        };

        if let Some(hit) = self.meta_mut(invocant).next_method.get(caller_fq_name) {
            return match hit {
                Some(method) => Ok(Some(Rc::clone(method))),
                None => miss(&self_name, method_name, throw),
            };
        }

        let lin = c3::linearize_c3(self, invocant, 0)?;
        let names = lin.names();

        let mut resolved: Option<Rc<Method>> = None;
        if let Some(pos) = names.iter().position(|n| n == caller_pkg) {
            for name in &names[pos + 1..] {
                let id = match self.resolve(name) {
                    Some(id) => id,
                    None => {
                        warn!(
                            "mro: can't locate class '{}' named in the linearization of '{}'",
                            name, self_name
                        );
                        continue;
                    }
                };
                if let Some(entry) = self.class(id).method(method_name) {
                    if !entry.is_cache_entry() {
                        resolved = Some(Rc::clone(&entry.body));
                        break;
                    }
                }
            }
        }

        self.meta_mut(invocant)
            .next_method
            .insert(caller_fq_name.to_string(), resolved.clone());

        match resolved {
            Some(method) => Ok(Some(method)),
            None => miss(&self_name, method_name, throw),
        }
    }
}

fn miss(class: &str, method: &str, throw: bool) -> MroResult<Option<Rc<Method>>> {
    if throw {
        Err(MroError::NoNextMethod {
            class: class.to_string(),
            method: method.to_string(),
        })
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walks_past_the_defining_class() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        let a_speak = reg.define_method(a, "speak").unwrap();
        reg.define_method(b, "speak").unwrap();

        let found = reg.next_method(b, "B::speak", false).unwrap().unwrap();
        assert!(Rc::ptr_eq(&found, &a_speak));
    }

    #[test]
    fn test_follows_c3_order_not_the_current_algorithm() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        let c = reg.define_class("C", &["A"]).unwrap();
        let d = reg.define_class("D", &["B", "C"]).unwrap();
        reg.define_method(a, "greet").unwrap();
        reg.define_method(b, "greet").unwrap();
        let c_greet = reg.define_method(c, "greet").unwrap();

        // DFS order from D would hit A after B; C3 order hits C first
        let found = reg.next_method(d, "B::greet", false).unwrap().unwrap();
        assert!(Rc::ptr_eq(&found, &c_greet));
    }

    #[test]
    fn test_miss_is_empty_or_throws() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        reg.define_method(b, "only_here").unwrap();

        assert_eq!(reg.next_method(b, "B::only_here", false).unwrap(), None);
        // the negative hit is cached; throw mode still honors it
        let err = reg.next_method(b, "B::only_here", true).unwrap_err();
        assert_eq!(
            err,
            MroError::NoNextMethod {
                class: "B".to_string(),
                method: "only_here".to_string(),
            }
        );
        let _ = a;
    }

    #[test]
    fn test_caller_outside_the_linearization_misses() {
        let mut reg = ClassRegistry::new();
        reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        assert_eq!(reg.next_method(b, "Elsewhere::m", false).unwrap(), None);
    }

    #[test]
    fn test_skips_dispatch_cache_entries() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        let c = reg.define_class("C", &["B"]).unwrap();
        let a_speak = reg.define_method(a, "speak").unwrap();
        reg.define_method(c, "speak").unwrap();
        // a dispatch cache planted A's method into B's table
        reg.cache_method(b, "speak", Rc::clone(&a_speak));

        let found = reg.next_method(c, "C::speak", false).unwrap().unwrap();
        assert!(Rc::ptr_eq(&found, &a_speak));
        // the real definition came from A's table, not B's stamped copy
        assert!(reg.class(b).method("speak").unwrap().is_cache_entry());
    }

    #[test]
    fn test_memoized_until_invalidated() {
        let mut reg = ClassRegistry::new();
        let a = reg.define_class("A", &[]).unwrap();
        let b = reg.define_class("B", &["A"]).unwrap();
        reg.define_method(a, "speak").unwrap();
        reg.define_method(b, "speak").unwrap();

        let first = reg.next_method(b, "B::speak", false).unwrap().unwrap();
        let again = reg.next_method(b, "B::speak", false).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &again));

        // a method change in the parent clears the memo
        let a_speak2 = reg.define_method(a, "speak").unwrap();
        let refreshed = reg.next_method(b, "B::speak", false).unwrap().unwrap();
        assert!(Rc::ptr_eq(&refreshed, &a_speak2));
    }
}
