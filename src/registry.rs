//! Name registry for uniquifying component names.
//!
//! Each [`SystemBuilder`](crate::graphs::SystemBuilder) owns one
//! `NameRegistry`; there is no process-wide naming state. Mechanism names
//! must be unique outright (a duplicate is a configuration error surfaced by
//! the builder), while generated projection names are uniquified by suffix
//! so implicit pathway wiring never collides.

use rustc_hash::FxHashMap;

/// Tracks names claimed within one system and uniquifies generated ones.
///
/// # Examples
///
/// ```rust
/// use neurograph::registry::NameRegistry;
///
/// let mut reg = NameRegistry::default();
/// assert!(reg.claim("decision"));
/// assert!(!reg.claim("decision"));
/// assert_eq!(reg.uniquify("proj"), "proj");
/// assert_eq!(reg.uniquify("proj"), "proj-1");
/// assert_eq!(reg.uniquify("proj"), "proj-2");
/// ```
#[derive(Debug, Default, Clone)]
pub struct NameRegistry {
    claimed: FxHashMap<String, usize>,
}

impl NameRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` exactly; returns `false` if it was already taken.
    pub fn claim(&mut self, name: &str) -> bool {
        if self.claimed.contains_key(name) {
            return false;
        }
        self.claimed.insert(name.to_string(), 0);
        true
    }

    /// Claim `base` or, if taken, the first free `base-N` variant.
    pub fn uniquify(&mut self, base: &str) -> String {
        match self.claimed.get_mut(base) {
            None => {
                self.claimed.insert(base.to_string(), 0);
                base.to_string()
            }
            Some(count) => {
                *count += 1;
                let mut candidate = format!("{base}-{count}");
                // Suffix may itself collide with an explicitly claimed name.
                while self.claimed.contains_key(&candidate) {
                    let count = self.claimed.get_mut(base).expect("base present");
                    *count += 1;
                    candidate = format!("{base}-{count}");
                }
                self.claimed.insert(candidate.clone(), 0);
                candidate
            }
        }
    }

    /// Whether `name` has been claimed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.claimed.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniquify_skips_explicit_claims() {
        let mut reg = NameRegistry::new();
        assert!(reg.claim("edge-1"));
        assert_eq!(reg.uniquify("edge"), "edge");
        // "edge-1" is taken, so the next generated name jumps to "edge-2".
        assert_eq!(reg.uniquify("edge"), "edge-2");
    }
}
