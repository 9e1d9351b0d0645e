//! Process-wide label-name registry.
//!
//! Enforces uniqueness across the whole analyser rather than per page:
//! two pages cannot both have a label called `function_8000`, even if
//! one of them is never mapped in at the same time as the other.

use std::collections::HashMap;

/// Maps label name to use-count. A name with use-count zero is absent.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    use_counts: HashMap<String, u32>,
}

impl LabelTable {
    #[must_use]
    pub fn new() -> Self {
        Self { use_counts: HashMap::new() }
    }

    #[must_use]
    pub fn is_taken(&self, name: &str) -> bool {
        self.use_counts.contains_key(name)
    }

    /// Registers `name`, returning the name actually registered: `name`
    /// itself if free, otherwise `name` with a numeric suffix appended
    /// until a free spelling is found.
    pub fn register(&mut self, name: &str) -> String {
        if !self.is_taken(name) {
            self.use_counts.insert(name.to_string(), 1);
            return name.to_string();
        }
        let mut suffix = 2u32;
        loop {
            let candidate = format!("{name}_{suffix}");
            if !self.is_taken(&candidate) {
                self.use_counts.insert(candidate.clone(), 1);
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Renames `old` to `new`, failing (returning `false`, leaving both
    /// untouched) if `new` is already taken by a different name.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return true;
        }
        if self.is_taken(new) {
            return false;
        }
        if let Some(count) = self.use_counts.remove(old) {
            self.use_counts.insert(new.to_string(), count);
            true
        } else {
            false
        }
    }

    /// Decrements `name`'s use-count, removing it entirely once it hits
    /// zero so the spelling becomes available again.
    pub fn remove(&mut self, name: &str) {
        if let Some(count) = self.use_counts.get_mut(name) {
            if *count <= 1 {
                self.use_counts.remove(name);
            } else {
                *count -= 1;
            }
        }
    }

    /// Drops every registered name; used on project load, matching the
    /// original's explicit reset on project load.
    pub fn clear(&mut self) {
        self.use_counts.clear();
    }

    /// Restores `name` at its exact spelling without uniquifying,
    /// incrementing its use-count. Used by command undo to put a
    /// removed label's name back exactly as it was, as opposed to
    /// [`Self::register`], which would rename it on a collision.
    pub fn reinsert(&mut self, name: &str) {
        *self.use_counts.entry(name.to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_uniquifies_on_collision() {
        let mut table = LabelTable::new();
        assert_eq!(table.register("function_8000"), "function_8000");
        assert_eq!(table.register("function_8000"), "function_8000_2");
        assert_eq!(table.register("function_8000"), "function_8000_3");
    }

    #[test]
    fn rename_refuses_taken_target() {
        let mut table = LabelTable::new();
        table.register("a");
        table.register("b");
        assert!(!table.rename("a", "b"));
        assert!(table.is_taken("a"));
        assert!(table.rename("a", "c"));
        assert!(!table.is_taken("a"));
        assert!(table.is_taken("c"));
    }

    #[test]
    fn remove_frees_the_spelling() {
        let mut table = LabelTable::new();
        table.register("x");
        table.remove("x");
        assert!(!table.is_taken("x"));
        assert_eq!(table.register("x"), "x");
    }
}
