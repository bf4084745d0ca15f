//! Process-wide catalog of brains the supervisor can start runs for, keyed
//! by the same title a [`brains_core::BrainBuilder`] registers at `build()`.

use std::collections::HashMap;
use std::sync::Arc;

use brains_core::Brain;
use serde::Serialize;

/// Listing entry for `GET /brains` (§6.2): the catalog only exposes a brain's
/// name and an author-supplied description, never its internal block graph.
#[derive(Debug, Clone, Serialize)]
pub struct BrainDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
}

pub struct BrainRegistry {
    entries: HashMap<String, (Arc<Brain>, String)>,
}

impl BrainRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a brain under its own title with a human-readable description.
    /// A brain title is already guaranteed process-unique by
    /// `BrainBuilder::build`, so this never needs to reject a duplicate.
    pub fn register(&mut self, brain: Arc<Brain>, description: impl Into<String>) {
        let title = brain.title.clone();
        self.entries.insert(title, (brain, description.into()));
    }

    pub fn get(&self, title: &str) -> Option<Arc<Brain>> {
        self.entries.get(title).map(|(brain, _)| brain.clone())
    }

    pub fn list(&self) -> Vec<BrainDescriptor> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|(title, (_, description))| BrainDescriptor {
                name: title.clone(),
                title: title.clone(),
                description: description.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.title.cmp(&b.title));
        out
    }
}

impl Default for BrainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brains_core::BrainBuilder;
    use brains_core::StepOutcome;

    #[test]
    fn registered_brains_are_listed_sorted_by_title() {
        brains_core::graph::clear_title_registry();
        let mut registry = BrainRegistry::new();
        let b = Arc::new(
            BrainBuilder::new("zeta")
                .step("noop", |i| Box::pin(async move { Ok(StepOutcome::State(i.state)) }))
                .build()
                .unwrap(),
        );
        let a = Arc::new(
            BrainBuilder::new("alpha")
                .step("noop", |i| Box::pin(async move { Ok(StepOutcome::State(i.state)) }))
                .build()
                .unwrap(),
        );
        registry.register(b, "the zeta brain");
        registry.register(a, "the alpha brain");

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "alpha");
        assert_eq!(listed[1].title, "zeta");
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("missing").is_none());
    }
}
