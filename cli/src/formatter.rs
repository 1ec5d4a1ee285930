use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Row, Table};
use publicodes::{DottedName, EvaluatedNode, Rule};
use std::collections::BTreeMap;

pub struct Formatter {}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter {
    pub fn new() -> Self {
        Self {}
    }

    /// Value, unit and the questions still to answer for one evaluation
    pub fn format_evaluation(&self, expression: &str, node: &EvaluatedNode) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(Row::from(vec![
            Cell::new(expression).set_alignment(CellAlignment::Left),
            Cell::new(""),
        ]));

        table.add_row(Row::from(vec![
            "Value".to_string(),
            node.node_value.to_string(),
        ]));
        if let Some(unit) = &node.unit {
            table.add_row(Row::from(vec!["Unit".to_string(), unit.to_string()]));
        }

        let missing = node.missing_by_weight();
        if !missing.is_empty() {
            let lines: Vec<String> = missing
                .iter()
                .map(|name| format!("{} ({})", name, node.missing_variables[*name]))
                .collect();
            table.add_row(Row::from(vec![
                "Missing".to_string(),
                lines.join("\n"),
            ]));
        }

        format!("{}\n", table)
    }

    /// Raw value only, for piping
    pub fn format_raw(&self, node: &EvaluatedNode) -> String {
        match &node.unit {
            Some(unit) => format!("{} {}\n", node.node_value, unit),
            None => format!("{}\n", node.node_value),
        }
    }

    pub fn format_rule_list(&self, rules: &BTreeMap<DottedName, Rule>) -> String {
        let mut ordered: Vec<&Rule> = rules.values().filter(|rule| !rule.implicit).collect();
        ordered.sort_by_key(|rule| rule.order);

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(Row::from(vec![
            Cell::new("Rule").set_alignment(CellAlignment::Left),
            Cell::new("Title").set_alignment(CellAlignment::Left),
            Cell::new("Unit").set_alignment(CellAlignment::Left),
        ]));

        for rule in ordered {
            let mut name = rule.name.to_string();
            if rule.question.is_some() {
                name.push_str(" ?");
            }
            table.add_row(Row::from(vec![
                name,
                rule.title.clone().unwrap_or_default(),
                rule.unit.as_ref().map(|unit| unit.to_string()).unwrap_or_default(),
            ]));
        }

        format!("{}\n", table)
    }

    pub fn format_compile_summary(
        &self,
        file_count: usize,
        rule_count: usize,
        folded: usize,
        removed: usize,
    ) -> String {
        format!(
            "Compiled {} files: {} rules, {} folded, {} removed\n",
            file_count, rule_count, folded, removed
        )
    }
}
