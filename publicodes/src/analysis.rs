//! Reference and dependency analysis
//!
//! Built once per resolved model and rebuilt whenever the model is rewritten
//! (after folding). Used by the folding pass and by introspection.

use crate::semantic::{DottedName, Expression, ExpressionKind, Rule};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Who references whom
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceMaps {
    /// Rules referenced by each rule's formula
    pub uses: BTreeMap<DottedName, BTreeSet<DottedName>>,
    /// Rules whose formula references each rule
    pub used_by: BTreeMap<DottedName, BTreeSet<DottedName>>,
}

impl ReferenceMaps {
    pub fn build(rules: &BTreeMap<DottedName, Rule>) -> Self {
        let mut maps = Self::default();
        for (name, rule) in rules {
            let references = collect_references(&rule.body);
            for reference in &references {
                maps.used_by
                    .entry(reference.clone())
                    .or_default()
                    .insert(name.clone());
            }
            maps.uses.insert(name.clone(), references);
        }
        maps
    }

    pub fn uses(&self, name: &DottedName) -> impl Iterator<Item = &DottedName> {
        self.uses.get(name).into_iter().flatten()
    }

    pub fn used_by(&self, name: &DottedName) -> impl Iterator<Item = &DottedName> {
        self.used_by.get(name).into_iter().flatten()
    }

    /// Number of rules referencing `name`
    pub fn reference_count(&self, name: &DottedName) -> usize {
        self.used_by.get(name).map_or(0, BTreeSet::len)
    }
}

/// Every resolved rule referenced by `expression`, including `contexte` keys
pub fn collect_references(expression: &Expression) -> BTreeSet<DottedName> {
    let mut references = BTreeSet::new();
    collect_into(expression, &mut references);
    references
}

fn collect_into(expression: &Expression, references: &mut BTreeSet<DottedName>) {
    match &expression.kind {
        ExpressionKind::Reference(reference) => {
            references.insert(reference.target().clone());
        }
        ExpressionKind::Context { overrides, .. } => {
            for (reference, _) in overrides {
                references.insert(reference.target().clone());
            }
        }
        _ => {}
    }
    for child in expression.children() {
        collect_into(child, references);
    }
}

/// Dependency order: every rule comes after the rules it references and after
/// its ancestors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyOrder {
    pub order: Vec<DottedName>,
    /// Rules on a cycle (declared circular references), or depending on one
    pub cyclic: BTreeSet<DottedName>,
}

pub fn dependency_order(
    rules: &BTreeMap<DottedName, Rule>,
    maps: &ReferenceMaps,
) -> DependencyOrder {
    let mut dependencies: BTreeMap<&DottedName, BTreeSet<&DottedName>> = BTreeMap::new();
    for name in rules.keys() {
        let mut deps: BTreeSet<&DottedName> = maps
            .uses(name)
            .filter(|dep| rules.contains_key(*dep) && *dep != name)
            .collect();
        for ancestor in name.ancestors() {
            if let Some((ancestor, _)) = rules.get_key_value(&ancestor) {
                deps.insert(ancestor);
            }
        }
        dependencies.insert(name, deps);
    }

    let mut dependents: BTreeMap<&DottedName, Vec<&DottedName>> = BTreeMap::new();
    let mut pending: BTreeMap<&DottedName, usize> = BTreeMap::new();
    for (name, deps) in &dependencies {
        pending.insert(*name, deps.len());
        for dep in deps {
            dependents.entry(*dep).or_default().push(*name);
        }
    }

    let mut queue: VecDeque<&DottedName> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(rules.len());
    while let Some(name) = queue.pop_front() {
        order.push(name.clone());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    let cyclic = pending
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(name, _)| name.clone())
        .collect();
    DependencyOrder { order, cyclic }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rules;
    use crate::resolver::resolve_rules;
    use crate::resource_limits::ResourceLimits;
    use serde_json::json;

    fn graph(raw: serde_json::Value) -> BTreeMap<DottedName, Rule> {
        resolve_rules(parse_rules(&raw, &ResourceLimits::default()).unwrap()).unwrap()
    }

    fn name(text: &str) -> DottedName {
        DottedName::parse(text)
    }

    #[test]
    fn maps_are_symmetric() {
        let rules = graph(json!({"a": 1, "b": "a + 1", "c": "a + b"}));
        let maps = ReferenceMaps::build(&rules);
        assert_eq!(maps.uses(&name("c")).count(), 2);
        assert_eq!(maps.reference_count(&name("a")), 2);
        assert!(maps.used_by(&name("b")).any(|n| n == &name("c")));
    }

    #[test]
    fn dependencies_come_first() {
        let rules = graph(json!({"total": "sous total * 2", "sous total": "prix", "prix": 3}));
        let maps = ReferenceMaps::build(&rules);
        let DependencyOrder { order, cyclic } = dependency_order(&rules, &maps);
        let position = |n: &str| order.iter().position(|o| o == &name(n)).unwrap();
        assert!(position("prix") < position("sous total"));
        assert!(position("sous total") < position("total"));
        assert!(cyclic.is_empty());
    }

    #[test]
    fn parents_come_before_children() {
        let rules = graph(json!({"a": "oui", "a . b": 2}));
        let order = dependency_order(&rules, &ReferenceMaps::build(&rules)).order;
        assert_eq!(order, vec![name("a"), name("a . b")]);
    }

    #[test]
    fn cycles_are_reported() {
        let rules = graph(json!({
            "x": {"valeur": "y + 1", "résoudre la référence circulaire": "oui"},
            "y": "x / 2",
            "z": "x",
            "w": 1,
        }));
        let DependencyOrder { order, cyclic } =
            dependency_order(&rules, &ReferenceMaps::build(&rules));
        assert_eq!(order, vec![name("w")]);
        assert_eq!(cyclic.len(), 3);
    }
}
