//! Rewriting of references targeted by `remplace` directives
//!
//! Every reference to a replaced rule becomes a `Replace` node listing the
//! replacing rules by decreasing priority. At evaluation the first candidate
//! that is applicable wins, otherwise the original rule is used.

use crate::semantic::{DottedName, Expression, ExpressionKind, Reference, Rule};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
struct Directive {
    declarer: DottedName,
    by: DottedName,
    priority: Decimal,
    order: usize,
    within: Vec<DottedName>,
    except: Vec<DottedName>,
}

impl Directive {
    /// Whether references found in rule `rule` are subject to this directive
    fn applies_in(&self, rule: &DottedName) -> bool {
        if rule == &self.declarer || rule == &self.by {
            return false;
        }
        if !self.within.is_empty() && !self.within.iter().any(|scope| rule.starts_with(scope)) {
            return false;
        }
        !self.except.iter().any(|scope| rule.starts_with(scope))
    }
}

/// Directives indexed by the rule they replace
#[derive(Debug)]
pub struct ReplacementTable {
    directives: HashMap<DottedName, Vec<Directive>>,
}

impl ReplacementTable {
    /// Collect the (already resolved) directives of every rule
    pub fn new(rules: &BTreeMap<DottedName, Rule>) -> Self {
        let mut directives: HashMap<DottedName, Vec<Directive>> = HashMap::new();
        for rule in rules.values() {
            for replacement in &rule.replacements {
                let resolved = |references: &[Reference]| -> Vec<DottedName> {
                    references.iter().map(|r| r.target().clone()).collect()
                };
                directives
                    .entry(replacement.target.target().clone())
                    .or_default()
                    .push(Directive {
                        declarer: rule.name.clone(),
                        by: replacement.by.clone(),
                        priority: replacement.priority,
                        order: rule.order,
                        within: resolved(&replacement.within),
                        except: resolved(&replacement.except),
                    });
            }
        }
        for list in directives.values_mut() {
            list.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.order.cmp(&b.order)));
        }
        Self { directives }
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Rules replaced by at least one directive
    pub fn targets(&self) -> impl Iterator<Item = &DottedName> {
        self.directives.keys()
    }

    /// Rewrite the references of `expression`, found in rule `context`
    pub fn rewrite(&self, context: &DottedName, expression: &mut Expression) {
        if let ExpressionKind::Reference(reference) = &expression.kind {
            let target = reference.target().clone();
            let mut visited = HashSet::new();
            if let Some(replaced) = self.replacement_for(&target, context, &mut visited) {
                *expression = Expression::new(replaced.kind, expression.span.clone());
            }
            return;
        }
        for child in expression.children_mut() {
            self.rewrite(context, child);
        }
    }

    /// The `Replace` node standing for a reference to `target` in `context`,
    /// or `None` when no directive applies there
    fn replacement_for(
        &self,
        target: &DottedName,
        context: &DottedName,
        visited: &mut HashSet<DottedName>,
    ) -> Option<Expression> {
        let directives = self.directives.get(target)?;
        let applicable: Vec<&Directive> = directives
            .iter()
            .filter(|directive| directive.applies_in(context))
            .collect();
        if applicable.is_empty() || !visited.insert(target.clone()) {
            return None;
        }

        let candidates = applicable
            .into_iter()
            .map(|directive| {
                // a replacing rule may itself be replaced
                self.replacement_for(&directive.by, context, visited)
                    .unwrap_or_else(|| Expression::reference(Reference::resolved(directive.by.clone())))
            })
            .collect();
        visited.remove(target);

        Some(Expression::new(
            ExpressionKind::Replace {
                original: Box::new(Expression::reference(Reference::resolved(target.clone()))),
                candidates,
            },
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rules;
    use crate::resolver::resolve_rules;
    use crate::resource_limits::ResourceLimits;
    use serde_json::json;

    #[test]
    fn table_lists_directives_by_target() {
        let raw = json!({
            "plafond": 100,
            "réforme": {"remplace": "plafond", "valeur": 150},
        });
        let rules = resolve_rules(parse_rules(&raw, &ResourceLimits::default()).unwrap()).unwrap();
        let table = ReplacementTable::new(&rules);
        let targets: Vec<&DottedName> = table.targets().collect();
        assert_eq!(targets, vec![&DottedName::parse("plafond")]);
        assert!(format!("{:?}", table).contains("réforme"));
    }
}
