//! Breaks cyclic schema references (e.g. a CMS-shaped `ContentInfo` nested inside its own
//! `SignedData` content) by letting a spec reference a sibling or itself by a stable name instead
//! of an owned pointer, resolved through a registry at decode/encode time rather than at schema
//! construction time.

use std::collections::HashMap;

use crate::spec::SpecRef;

#[derive(Clone, Default)]
pub struct Registry {
    entries: HashMap<String, SpecRef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, spec: SpecRef) -> &mut Self {
        self.entries.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<SpecRef> {
        self.entries.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecKind;

    #[test]
    fn register_and_resolve() {
        let mut registry = Registry::new();
        registry.register("Boolean", SpecRef::new(SpecKind::Boolean));
        assert!(registry.get("Boolean").is_some());
        assert!(registry.get("Missing").is_none());
    }
}
