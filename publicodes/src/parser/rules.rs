//! Rule declarations: metadata, `avec` children and `remplace` directives
//!
//! The value part of a declaration is handed to the mechanism compiler.

use crate::error::PublicodesError;
use crate::parser::literals;
use crate::parser::mechanisms::MechanismCompiler;
use crate::parser::units;
use crate::resource_limits::ResourceLimits;
use crate::semantic::{DottedName, Expression, ExpressionKind, Reference, Replacement, Rule};
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use tracing::debug;

/// Keys describing a rule rather than computing its value
pub const METADATA_KEYS: &[&str] = &[
    "titre",
    "description",
    "question",
    "note",
    "références",
    "icônes",
    "résumé",
    "type",
    "suggestions",
    "identifiant court",
    "experimental",
    "privé",
    "possibilités",
    "remplace",
    "avec",
    "résoudre la référence circulaire",
];

/// Compile every rule of a model. All errors are collected before failing.
pub fn parse_rules(raw: &JsonValue, limits: &ResourceLimits) -> Result<Vec<Rule>, PublicodesError> {
    let model = raw.as_object().ok_or_else(|| PublicodesError::RuleDefinition {
        rule: String::new(),
        key: String::new(),
        message: "a model must map rule names to declarations".to_string(),
    })?;
    if model.len() > limits.max_rules {
        return Err(PublicodesError::ResourceLimitExceeded {
            limit_name: "max_rules".to_string(),
            limit_value: limits.max_rules.to_string(),
            actual_value: model.len().to_string(),
            suggestion: "Split the model".to_string(),
        });
    }

    let mut builder = RuleBuilder::new(limits);
    for (key, declaration) in model {
        builder.add(DottedName::parse(key), declaration);
    }
    builder.finish()
}

struct RuleBuilder<'a> {
    limits: &'a ResourceLimits,
    rules: Vec<Rule>,
    names: HashSet<DottedName>,
    errors: Vec<PublicodesError>,
}

impl<'a> RuleBuilder<'a> {
    fn new(limits: &'a ResourceLimits) -> Self {
        Self {
            limits,
            rules: Vec::new(),
            names: HashSet::new(),
            errors: Vec::new(),
        }
    }

    fn finish(self) -> Result<Vec<Rule>, PublicodesError> {
        if self.errors.is_empty() {
            debug!(rules = self.rules.len(), "compiled rule declarations");
            Ok(self.rules)
        } else {
            Err(PublicodesError::from_errors(self.errors))
        }
    }

    fn add(&mut self, name: DottedName, declaration: &JsonValue) {
        if name.is_empty() {
            self.errors.push(PublicodesError::rule_definition(
                &name,
                "",
                "a rule name cannot be empty",
            ));
            return;
        }
        if !self.names.insert(name.clone()) {
            self.errors.push(PublicodesError::rule_definition(
                &name,
                "",
                "rule declared twice",
            ));
            return;
        }
        if let Err(error) = self.add_rule(name, declaration) {
            self.errors.push(error);
        }
    }

    fn add_rule(&mut self, name: DottedName, declaration: &JsonValue) -> Result<(), PublicodesError> {
        let compiler = MechanismCompiler::new(&name, self.limits);
        let mut rule = Rule {
            name: name.clone(),
            raw: declaration.clone(),
            title: None,
            description: None,
            question: None,
            unit: None,
            private: false,
            implicit: false,
            has_default: false,
            possibilities: None,
            replacements: Vec::new(),
            body: Expression::new(ExpressionKind::Input(name.clone()), None),
            order: self.rules.len(),
            folded: false,
        };

        let map = match declaration {
            JsonValue::Null => {
                self.rules.push(rule);
                return Ok(());
            }
            JsonValue::Object(map) => map,
            JsonValue::Array(_) => {
                return Err(PublicodesError::rule_definition(
                    &name,
                    "",
                    "a rule declaration cannot be a list",
                ))
            }
            scalar => {
                rule.body = compiler.compile_value("valeur", scalar)?;
                self.rules.push(rule);
                return Ok(());
            }
        };

        rule.title = optional_text(&name, map, "titre")?;
        rule.description = optional_text(&name, map, "description")?;
        rule.question = optional_text(&name, map, "question")?;
        rule.private = map
            .get("privé")
            .map(|value| flag(&name, "privé", value))
            .transpose()?
            .unwrap_or(false);
        rule.has_default = map.contains_key("par défaut");
        rule.possibilities = map
            .get("possibilités")
            .map(|value| possibilities(&name, value))
            .transpose()?;
        if let Some(unit) = map.get("unité") {
            let text = unit.as_str().ok_or_else(|| {
                PublicodesError::rule_definition(&name, "unité", "expected a unit")
            })?;
            rule.unit = Some(units::parse_unit(text)?);
        }

        let mechanisms: Map<String, JsonValue> = map
            .iter()
            .filter(|(key, _)| !METADATA_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let input = Expression::new(ExpressionKind::Input(name.clone()), None);
        rule.body = compiler.compile_object(&mechanisms, Some(input))?;

        let circular = map
            .get("résoudre la référence circulaire")
            .map(|value| flag(&name, "résoudre la référence circulaire", value))
            .transpose()?
            .unwrap_or(false);
        if circular {
            rule.body = Expression::new(
                ExpressionKind::CircularResolution {
                    rule: name.clone(),
                    value: Box::new(rule.body),
                },
                None,
            );
        }

        let mut implicit_rules = Vec::new();
        if let Some(directives) = map.get("remplace") {
            let list: Vec<&JsonValue> = match directives {
                JsonValue::Array(items) => items.iter().collect(),
                single => vec![single],
            };
            for (index, directive) in list.into_iter().enumerate() {
                let (replacement, implicit) =
                    parse_replacement(&compiler, &name, index, directive)?;
                rule.replacements.push(replacement);
                implicit_rules.extend(implicit);
            }
        }

        self.rules.push(rule);
        for mut implicit in implicit_rules {
            if self.names.insert(implicit.name.clone()) {
                implicit.order = self.rules.len();
                self.rules.push(implicit);
            }
        }

        if let Some(children) = map.get("avec") {
            let children = children.as_object().ok_or_else(|| {
                PublicodesError::rule_definition(&name, "avec", "expected a mapping of rules")
            })?;
            for (key, child) in children {
                self.add(name.join(&DottedName::parse(key)), child);
            }
        }
        Ok(())
    }
}

fn optional_text(
    name: &DottedName,
    map: &Map<String, JsonValue>,
    key: &str,
) -> Result<Option<String>, PublicodesError> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(PublicodesError::rule_definition(name, key, "expected a text")),
    }
}

/// `oui`/`non` given as a YAML string or a boolean
fn flag(name: &DottedName, key: &str, value: &JsonValue) -> Result<bool, PublicodesError> {
    match value {
        JsonValue::Bool(b) => Ok(*b),
        JsonValue::String(text) if text.trim() == "oui" => Ok(true),
        JsonValue::String(text) if text.trim() == "non" => Ok(false),
        _ => Err(PublicodesError::rule_definition(name, key, "expected oui or non")),
    }
}

fn possibilities(name: &DottedName, value: &JsonValue) -> Result<Vec<String>, PublicodesError> {
    let items = value.as_array().ok_or_else(|| {
        PublicodesError::rule_definition(name, "possibilités", "expected a list of texts")
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|text| literals::unquote(text).to_string())
                .ok_or_else(|| {
                    PublicodesError::rule_definition(name, "possibilités", "expected a text")
                })
        })
        .collect()
}

fn references(
    name: &DottedName,
    key: &str,
    value: Option<&JsonValue>,
) -> Result<Vec<Reference>, PublicodesError> {
    match value {
        None => Ok(Vec::new()),
        Some(JsonValue::String(text)) => Ok(vec![Reference::new(DottedName::parse(text))]),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|text| Reference::new(DottedName::parse(text)))
                    .ok_or_else(|| {
                        PublicodesError::rule_definition(name, key, "expected rule names")
                    })
            })
            .collect(),
        Some(_) => Err(PublicodesError::rule_definition(name, key, "expected rule names")),
    }
}

/// One `remplace` directive, with the implicit rule created for `par`
fn parse_replacement(
    compiler: &MechanismCompiler,
    name: &DottedName,
    index: usize,
    directive: &JsonValue,
) -> Result<(Replacement, Option<Rule>), PublicodesError> {
    let map = match directive {
        JsonValue::String(target) => {
            return Ok((
                Replacement {
                    target: Reference::new(DottedName::parse(target)),
                    by: name.clone(),
                    priority: Decimal::ZERO,
                    within: Vec::new(),
                    except: Vec::new(),
                },
                None,
            ))
        }
        JsonValue::Object(map) => map,
        _ => {
            return Err(PublicodesError::rule_definition(
                name,
                "remplace",
                "expected a rule name or a mapping",
            ))
        }
    };

    for key in map.keys() {
        if !matches!(
            key.as_str(),
            "références à" | "priorité" | "dans" | "sauf dans" | "par"
        ) {
            return Err(PublicodesError::rule_definition(
                name,
                "remplace",
                format!("unknown key '{}'", key),
            ));
        }
    }

    let target = map
        .get("références à")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| {
            PublicodesError::rule_definition(name, "remplace", "missing 'références à'")
        })?;
    let priority = match map.get("priorité") {
        None => Decimal::ZERO,
        Some(JsonValue::Number(n)) => literals::number_from_json(n).ok_or_else(|| {
            PublicodesError::rule_definition(name, "priorité", "invalid number")
        })?,
        Some(JsonValue::String(text)) => literals::parse_number(text).ok_or_else(|| {
            PublicodesError::rule_definition(name, "priorité", "invalid number")
        })?,
        Some(_) => {
            return Err(PublicodesError::rule_definition(
                name,
                "priorité",
                "expected a number",
            ))
        }
    };

    let (by, implicit) = match map.get("par") {
        None => (name.clone(), None),
        Some(value) => {
            let implicit_name = name.child(format!("[remplacement {}]", index));
            let rule = Rule {
                name: implicit_name.clone(),
                raw: JsonValue::Null,
                title: None,
                description: None,
                question: None,
                unit: None,
                private: true,
                implicit: true,
                has_default: false,
                possibilities: None,
                replacements: Vec::new(),
                body: compiler.compile_value("par", value)?,
                order: 0,
                folded: false,
            };
            (implicit_name, Some(rule))
        }
    };

    Ok((
        Replacement {
            target: Reference::new(DottedName::parse(target)),
            by,
            priority,
            within: references(name, "dans", map.get("dans"))?,
            except: references(name, "sauf dans", map.get("sauf dans"))?,
        },
        implicit,
    ))
}
