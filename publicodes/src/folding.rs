//! Constant folding
//!
//! Rules whose value does not depend on the situation are computed once and
//! their value is spliced into the rules referencing them. A rule that is no
//! longer referenced after splicing is removed, unless it is kept explicitly,
//! still has children, or was never referenced in the first place (an output
//! of the model).
//!
//! A rule is never folded when its value could change at evaluation time: it
//! asks a question, has a default, takes part in a replacement, is overridden
//! by a `contexte` (or depends on such a rule) or sits on a circular
//! reference.

use crate::analysis::{dependency_order, ReferenceMaps};
use crate::error::PublicodesError;
use crate::evaluator::{evaluate_expression, evaluate_rule, EvaluationContext};
use crate::resource_limits::ResourceLimits;
use crate::semantic::{DottedName, Expression, ExpressionKind, Rule};
use crate::serializers::rules_to_raw;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct FoldingOptions {
    /// Rules never removed, even when no rule references them anymore
    pub keep: Vec<DottedName>,
}

/// A folded model
#[derive(Debug, Clone)]
pub struct FoldedRules {
    rules: BTreeMap<DottedName, Rule>,
    removed: BTreeSet<DottedName>,
}

impl FoldedRules {
    pub fn rules(&self) -> &BTreeMap<DottedName, Rule> {
        &self.rules
    }

    pub fn into_rules(self) -> BTreeMap<DottedName, Rule> {
        self.rules
    }

    /// Rules removed because every reference to them was replaced by their value
    pub fn removed(&self) -> &BTreeSet<DottedName> {
        &self.removed
    }

    pub fn reference_maps(&self) -> ReferenceMaps {
        ReferenceMaps::build(&self.rules)
    }

    /// The folded model as raw declarations, loadable by `Engine::new`
    pub fn to_json(&self) -> JsonValue {
        rules_to_raw(&self.rules)
    }
}

pub fn fold_rules(
    rules: &BTreeMap<DottedName, Rule>,
    maps: &ReferenceMaps,
    options: &FoldingOptions,
    limits: &ResourceLimits,
    strict_units: bool,
) -> Result<FoldedRules, PublicodesError> {
    let order = dependency_order(rules, maps);
    let frozen = unfoldable_rules(rules, maps, &order.cyclic);

    let empty_situation = BTreeMap::new();
    let mut ctx =
        EvaluationContext::new(rules, &empty_situation, limits).with_strict_units(strict_units);

    let mut folded = rules.clone();
    let mut reference_counts: BTreeMap<DottedName, usize> = rules
        .keys()
        .map(|name| (name.clone(), maps.reference_count(name)))
        .collect();
    let mut removed = BTreeSet::new();
    let keep: BTreeSet<&DottedName> = options.keep.iter().collect();

    for name in &order.order {
        if frozen.contains(name) {
            continue;
        }
        let Some(rule) = folded.get(name) else {
            continue;
        };
        if rule.folded {
            continue;
        }

        let evaluation = match evaluate_rule(name, &mut ctx) {
            Ok(evaluation) => evaluation,
            Err(error) => {
                debug!(rule = %name, %error, "not folding a rule that fails to evaluate");
                continue;
            }
        };

        if evaluation.missing.is_empty() && !evaluation.value.is_missing() {
            let constant = Expression::constant(evaluation.value, evaluation.unit);
            debug!(rule = %name, value = ?constant.kind, "folding rule to a constant");

            for dependent in maps.used_by(name) {
                if let Some(dependent) = folded.get_mut(dependent) {
                    inline_rule(&mut dependent.body, name, &constant);
                }
            }
            if let Some(rule) = folded.get_mut(name) {
                rule.body = constant;
                rule.folded = true;
            }

            let count = reference_counts.entry(name.clone()).or_default();
            let was_referenced = *count > 0;
            *count = 0;
            let has_children = folded
                .keys()
                .any(|other| other != name && other.starts_with(name));
            if was_referenced && !has_children && !keep.contains(name) {
                debug!(rule = %name, "removing rule no longer referenced");
                folded.remove(name);
                removed.insert(name.clone());
            }
        } else if let Some(rule) = folded.get_mut(name) {
            if fold_subexpressions(&mut rule.body, rules, limits, strict_units) {
                debug!(rule = %name, "folded constant parts of rule");
                rule.folded = true;
            }
        }
    }

    Ok(FoldedRules {
        rules: folded,
        removed,
    })
}

/// Rules whose value may differ between evaluations
fn unfoldable_rules(
    rules: &BTreeMap<DottedName, Rule>,
    maps: &ReferenceMaps,
    cyclic: &BTreeSet<DottedName>,
) -> BTreeSet<DottedName> {
    let mut frozen: BTreeSet<DottedName> = cyclic.clone();
    let mut overridden = Vec::new();

    for rule in rules.values() {
        if rule.question.is_some() || rule.has_default || rule.implicit {
            frozen.insert(rule.name.clone());
        }
        for replacement in &rule.replacements {
            frozen.insert(rule.name.clone());
            frozen.insert(replacement.by.clone());
            frozen.insert(replacement.target.target().clone());
        }
        collect_context_keys(&rule.body, &mut overridden);
    }

    // everything whose value follows an overridden rule: dependents and descendants
    let mut queue: VecDeque<DottedName> = overridden.into_iter().collect();
    let mut seen = BTreeSet::new();
    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        queue.extend(maps.used_by(&name).cloned());
        queue.extend(
            rules
                .keys()
                .filter(|other| *other != &name && other.starts_with(&name))
                .cloned(),
        );
    }
    frozen.extend(seen);
    frozen
}

fn collect_context_keys(expression: &Expression, keys: &mut Vec<DottedName>) {
    if let ExpressionKind::Context { overrides, .. } = &expression.kind {
        keys.extend(overrides.iter().map(|(reference, _)| reference.target().clone()));
    }
    for child in expression.children() {
        collect_context_keys(child, keys);
    }
}

/// Replace every reference to `name` by `constant`
fn inline_rule(expression: &mut Expression, name: &DottedName, constant: &Expression) {
    if let ExpressionKind::Reference(reference) = &expression.kind {
        if reference.target() == name {
            let span = expression.span.clone();
            *expression = constant.clone();
            expression.span = span;
        }
        return;
    }
    for child in expression.children_mut() {
        inline_rule(child, name, constant);
    }
}

/// Whether `expression` can be computed without looking at any rule
fn is_closed(expression: &Expression) -> bool {
    match &expression.kind {
        ExpressionKind::Reference(_)
        | ExpressionKind::Input(_)
        | ExpressionKind::Context { .. }
        | ExpressionKind::CircularResolution { .. } => false,
        _ => expression.children().into_iter().all(is_closed),
    }
}

/// Fold the largest closed subexpressions of `expression`. Returns whether
/// anything changed.
fn fold_subexpressions(
    expression: &mut Expression,
    rules: &BTreeMap<DottedName, Rule>,
    limits: &ResourceLimits,
    strict_units: bool,
) -> bool {
    if expression.is_constant() {
        return false;
    }
    if is_closed(expression) {
        let empty_situation = BTreeMap::new();
        let mut ctx =
            EvaluationContext::new(rules, &empty_situation, limits).with_strict_units(strict_units);
        if let Ok(evaluation) = evaluate_expression(expression, &mut ctx) {
            if !evaluation.value.is_missing() && evaluation.missing.is_empty() {
                let span = expression.span.clone();
                *expression = Expression::constant(evaluation.value, evaluation.unit);
                expression.span = span;
                return true;
            }
        }
        return false;
    }

    let mut changed = false;
    for child in expression.children_mut() {
        changed |= fold_subexpressions(child, rules, limits, strict_units);
    }
    changed
}
