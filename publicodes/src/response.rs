use crate::evaluator::Evaluation;
use crate::semantic::{DottedName, Unit, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Result of `Engine::evaluate`
///
/// Serializes as `{nodeValue, unit, missingVariables, traversedVariables}`;
/// `nodeValue` is absent when the value is missing and `null` when it is not
/// applicable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedNode {
    #[serde(skip_serializing_if = "Value::is_missing")]
    pub node_value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    /// Inputs to ask for, weighted by how often they block the computation
    pub missing_variables: BTreeMap<DottedName, u32>,
    pub traversed_variables: BTreeSet<DottedName>,
}

impl EvaluatedNode {
    pub fn is_missing(&self) -> bool {
        self.node_value.is_missing()
    }

    pub fn is_not_applicable(&self) -> bool {
        self.node_value.is_not_applicable()
    }

    /// Names of the missing inputs, most blocking first
    pub fn missing_by_weight(&self) -> Vec<&DottedName> {
        let mut names: Vec<(&DottedName, u32)> = self
            .missing_variables
            .iter()
            .map(|(name, weight)| (name, *weight))
            .collect();
        names.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        names.into_iter().map(|(name, _)| name).collect()
    }
}

impl From<Evaluation> for EvaluatedNode {
    fn from(evaluation: Evaluation) -> Self {
        let unit = match &evaluation.value {
            Value::Number(_) if !evaluation.unit.is_empty() => Some(evaluation.unit),
            _ => None,
        };
        Self {
            node_value: evaluation.value,
            unit,
            missing_variables: evaluation.missing,
            traversed_variables: evaluation.needed,
        }
    }
}
