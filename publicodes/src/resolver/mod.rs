//! Name resolution and replacement rewriting
//!
//! Runs once on a compiled model: afterwards every reference carries its fully
//! qualified target and references to replaced rules are `Replace` nodes.

pub mod references;
pub mod replacements;

pub use references::ReferenceResolver;
pub use replacements::ReplacementTable;

use crate::analysis::collect_references;
use crate::error::PublicodesError;
use crate::semantic::{DottedName, Rule};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Index compiled rules by name, resolve their references and apply
/// replacements. Every unknown reference is reported.
pub fn resolve_rules(rules: Vec<Rule>) -> Result<BTreeMap<DottedName, Rule>, PublicodesError> {
    let mut graph: BTreeMap<DottedName, Rule> = rules
        .into_iter()
        .map(|rule| (rule.name.clone(), rule))
        .collect();

    let mut resolver = ReferenceResolver::new(&graph);
    let mut errors = Vec::new();
    for rule in graph.values_mut() {
        let name = rule.name.clone();
        resolver.resolve_expression(&name, &mut rule.body, &mut errors);
        for replacement in &mut rule.replacements {
            let references = std::iter::once(&mut replacement.target)
                .chain(replacement.within.iter_mut())
                .chain(replacement.except.iter_mut());
            for reference in references {
                match resolver.resolve(&name, &reference.name) {
                    Ok(resolved) => reference.resolved = Some(resolved),
                    Err(error) => errors.push(error),
                }
            }
        }
    }
    if !errors.is_empty() {
        return Err(PublicodesError::from_errors(errors));
    }

    let table = ReplacementTable::new(&graph);
    if !table.is_empty() {
        debug!(targets = table.targets().count(), "applying replacements");
        let referenced: BTreeSet<DottedName> = graph
            .values()
            .flat_map(|rule| collect_references(&rule.body))
            .collect();
        for target in table.targets().filter(|target| !referenced.contains(*target)) {
            warn!(rule = %target, "replaced rule is never referenced");
        }
        for rule in graph.values_mut() {
            let name = rule.name.clone();
            table.rewrite(&name, &mut rule.body);
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rules;
    use crate::resource_limits::ResourceLimits;
    use crate::semantic::ExpressionKind;
    use serde_json::json;

    fn resolve(model: serde_json::Value) -> Result<BTreeMap<DottedName, Rule>, PublicodesError> {
        resolve_rules(parse_rules(&model, &ResourceLimits::default())?)
    }

    #[test]
    fn reports_every_unknown_reference() {
        let error = resolve(json!({"a": "b + 1", "c": "d * 2"})).unwrap_err();
        assert_eq!(error.into_errors().len(), 2);
    }

    #[test]
    fn replacements_skip_the_replacing_rule() {
        let graph = resolve(json!({
            "prix": 10,
            "promo": {"remplace": "prix", "valeur": "prix - 2"},
            "total": "prix * 3",
        }))
        .unwrap();

        let total = &graph[&DottedName::parse("total")];
        match &total.body.kind {
            ExpressionKind::Binary { left, .. } => {
                assert!(matches!(left.kind, ExpressionKind::Replace { .. }))
            }
            other => panic!("expected a product, got {:?}", other),
        }

        let promo = &graph[&DottedName::parse("promo")];
        match &promo.body.kind {
            ExpressionKind::Binary { left, .. } => {
                assert!(matches!(left.kind, ExpressionKind::Reference(_)))
            }
            other => panic!("expected a subtraction, got {:?}", other),
        }
    }

    #[test]
    fn scoped_replacements() {
        let graph = resolve(json!({
            "taux": "10 %",
            "réduit": {"remplace": {"références à": "taux", "dans": "export"}, "valeur": "5 %"},
            "export": "taux * 100",
            "import": "taux * 100",
        }))
        .unwrap();
        let is_replaced = |name: &str| match &graph[&DottedName::parse(name)].body.kind {
            ExpressionKind::Binary { left, .. } => matches!(left.kind, ExpressionKind::Replace { .. }),
            _ => false,
        };
        assert!(is_replaced("export"));
        assert!(!is_replaced("import"));
    }
}
