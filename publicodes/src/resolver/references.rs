use crate::error::PublicodesError;
use crate::semantic::{DottedName, Expression, ExpressionKind, Rule};
use std::collections::{BTreeMap, HashMap};

/// Resolves names written in formulas to fully qualified rule names
///
/// From inside rule `R`, a name `x` is looked up as a child of `R`, then in
/// `R`'s namespace, then in every enclosing namespace up to the root. `R`
/// itself is never a candidate, so a rule cannot name itself.
pub struct ReferenceResolver {
    /// Every rule name, with its `privé` flag
    rules: HashMap<DottedName, bool>,
    cache: HashMap<(DottedName, DottedName), Option<DottedName>>,
}

impl ReferenceResolver {
    pub fn new(rules: &BTreeMap<DottedName, Rule>) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|(name, rule)| (name.clone(), rule.private))
                .collect(),
            cache: HashMap::new(),
        }
    }

    pub fn contains(&self, name: &DottedName) -> bool {
        self.rules.contains_key(name)
    }

    /// Resolve `reference` as written inside `context` (the root for ad hoc
    /// expressions)
    pub fn resolve(
        &mut self,
        context: &DottedName,
        reference: &DottedName,
    ) -> Result<DottedName, PublicodesError> {
        let key = (context.clone(), reference.clone());
        let resolved = match self.cache.get(&key) {
            Some(resolved) => resolved.clone(),
            None => {
                let resolved = self.lookup(context, reference);
                self.cache.insert(key, resolved.clone());
                resolved
            }
        };
        resolved.ok_or_else(|| PublicodesError::UnknownReference {
            rule: context.to_string(),
            reference: reference.to_string(),
        })
    }

    fn lookup(&self, context: &DottedName, reference: &DottedName) -> Option<DottedName> {
        let mut namespace = Some(context.clone());
        while let Some(current) = namespace {
            let candidate = current.join(reference);
            if &candidate != context && self.is_visible(&candidate, context) {
                return Some(candidate);
            }
            namespace = current.parent();
        }
        None
    }

    /// A private rule is only visible from inside its parent namespace
    fn is_visible(&self, candidate: &DottedName, from: &DottedName) -> bool {
        match self.rules.get(candidate) {
            None => false,
            Some(false) => true,
            Some(true) => candidate
                .parent()
                .map(|parent| from.starts_with(&parent))
                .unwrap_or(true),
        }
    }

    /// Resolve every reference of `expression` in place. Errors are collected
    /// so one pass reports every unknown name.
    pub fn resolve_expression(
        &mut self,
        context: &DottedName,
        expression: &mut Expression,
        errors: &mut Vec<PublicodesError>,
    ) {
        match &mut expression.kind {
            ExpressionKind::Reference(reference) => {
                match self.resolve(context, &reference.name) {
                    Ok(name) => reference.resolved = Some(name),
                    Err(error) => errors.push(error),
                }
                return;
            }
            ExpressionKind::Context { overrides, .. } => {
                for (reference, _) in overrides.iter_mut() {
                    match self.resolve(context, &reference.name) {
                        Ok(name) => reference.resolved = Some(name),
                        Err(error) => errors.push(error),
                    }
                }
            }
            _ => {}
        }
        for child in expression.children_mut() {
            self.resolve_expression(context, child, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rules;
    use crate::resource_limits::ResourceLimits;
    use serde_json::json;

    fn resolver(model: serde_json::Value) -> ReferenceResolver {
        let rules = parse_rules(&model, &ResourceLimits::default())
            .unwrap()
            .into_iter()
            .map(|rule| (rule.name.clone(), rule))
            .collect();
        ReferenceResolver::new(&rules)
    }

    #[test]
    fn prefers_children_then_siblings_then_ancestors() {
        let mut resolver = resolver(json!({
            "a": null,
            "a . b": null,
            "a . b . c": null,
            "a . c": null,
            "c": null,
        }));
        let b = DottedName::parse("a . b");
        assert_eq!(
            resolver.resolve(&b, &DottedName::parse("c")).unwrap(),
            DottedName::parse("a . b . c")
        );
        let bc = DottedName::parse("a . b . c");
        assert_eq!(
            resolver.resolve(&bc, &DottedName::parse("c")).unwrap(),
            DottedName::parse("a . c")
        );
        assert_eq!(
            resolver
                .resolve(&DottedName::root(), &DottedName::parse("c"))
                .unwrap(),
            DottedName::parse("c")
        );
    }

    #[test]
    fn a_rule_cannot_name_itself() {
        let mut resolver = resolver(json!({"prix": null}));
        let prix = DottedName::parse("prix");
        assert!(matches!(
            resolver.resolve(&prix, &prix),
            Err(PublicodesError::UnknownReference { .. })
        ));
    }

    #[test]
    fn private_rules_are_scoped_to_their_namespace() {
        let mut resolver = resolver(json!({
            "impôt": null,
            "impôt . barème": {"privé": "oui"},
            "impôt . montant": null,
            "salaire": null,
        }));
        assert!(resolver
            .resolve(&DottedName::parse("impôt . montant"), &DottedName::parse("barème"))
            .is_ok());
        assert!(resolver
            .resolve(&DottedName::parse("salaire"), &DottedName::parse("impôt . barème"))
            .is_err());
    }
}
