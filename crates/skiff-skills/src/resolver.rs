// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{SkillDefinition, SkillRegistry};

/// Name and description of a capability, for prompts and listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<&SkillDefinition> for CapabilitySummary {
    fn from(def: &SkillDefinition) -> Self {
        Self { id: def.id.clone(), name: def.name.clone(), description: def.description.clone() }
    }
}

/// Answers "which capability does this id name?" without touching the
/// filesystem.  The engine and the orchestrator depend on this trait rather
/// than on a concrete registry.
pub trait CapabilityResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Option<SkillDefinition>;

    /// Every resolvable capability, sorted by id.
    fn available(&self) -> Vec<CapabilitySummary>;

    fn available_ids(&self) -> Vec<String> {
        self.available().into_iter().map(|c| c.id).collect()
    }
}

/// Resolver backed by a shared [`SkillRegistry`] snapshot.
#[derive(Clone)]
pub struct RegistryResolver {
    registry: Arc<SkillRegistry>,
}

impl RegistryResolver {
    pub fn new(registry: Arc<SkillRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }
}

impl CapabilityResolver for RegistryResolver {
    fn resolve(&self, id: &str) -> Option<SkillDefinition> {
        self.registry.lookup(id)
    }

    fn available(&self) -> Vec<CapabilitySummary> {
        self.registry.list().iter().map(CapabilitySummary::from).collect()
    }
}

/// Fixed set of definitions, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    skills: BTreeMap<String, SkillDefinition>,
}

impl StaticResolver {
    pub fn new(skills: impl IntoIterator<Item = SkillDefinition>) -> Self {
        Self { skills: skills.into_iter().map(|s| (s.id.clone(), s)).collect() }
    }
}

impl CapabilityResolver for StaticResolver {
    fn resolve(&self, id: &str) -> Option<SkillDefinition> {
        self.skills.get(id).cloned()
    }

    fn available(&self) -> Vec<CapabilitySummary> {
        self.skills.values().map(CapabilitySummary::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::tests::skill_text;
    use crate::{parse, SkillDirectories};
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn static_resolver_lists_sorted_summaries() {
        let b = parse(&skill_text("beta-skill", &["grep"], ""), Path::new("b.skill.md")).unwrap();
        let a = parse(&skill_text("alpha", &["grep"], ""), Path::new("a.skill.md")).unwrap();
        let r = StaticResolver::new([b, a]);
        assert_eq!(r.available_ids(), vec!["alpha", "beta-skill"]);
        assert_eq!(r.available()[1].name, "Beta Skill");
        assert!(r.resolve("gamma").is_none());
    }

    #[tokio::test]
    async fn registry_resolver_sees_reloads() {
        let tmp = TempDir::new().unwrap();
        let registry = Arc::new(SkillRegistry::new(SkillDirectories {
            project: Some(tmp.path().to_path_buf()),
            ..SkillDirectories::default()
        }));
        let resolver = RegistryResolver::new(Arc::clone(&registry));
        assert!(resolver.resolve("explore").is_none());

        std::fs::write(tmp.path().join("e.skill.md"), skill_text("explore", &["glob"], "")).unwrap();
        registry.load().await.unwrap();
        assert_eq!(resolver.resolve("explore").unwrap().tools, vec!["glob"]);
        assert_eq!(resolver.available_ids(), vec!["explore"]);
    }
}
