use crate::analysis::ReferenceMaps;
use crate::error::PublicodesError;
use crate::evaluator::{evaluate_expression, Evaluation, EvaluationContext};
use crate::folding::{fold_rules, FoldedRules, FoldingOptions};
use crate::parser::{parse_formula, parse_rules};
use crate::resolver::{resolve_rules, ReferenceResolver, ReplacementTable};
use crate::resource_limits::ResourceLimits;
use crate::response::EvaluatedNode;
use crate::semantic::{DottedName, Expression, Reference, Rule};
use crate::situation::{compile_situation, SituationValue};
use crate::PublicodesResult;
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub limits: ResourceLimits,
    /// Fail on inconvertible units instead of logging a warning
    pub strict_units: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            strict_units: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SituationOptions {
    /// Merge with the current situation instead of replacing it
    pub keep_previous: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluationOptions {
    /// Reuse rule values computed by previous evaluations of the same situation
    pub use_cache: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// A resolved model, shared by an engine and its shallow copies
#[derive(Debug)]
struct CompiledModel {
    rules: BTreeMap<DottedName, Rule>,
    maps: ReferenceMaps,
    replacements: ReplacementTable,
}

/// The Publicodes evaluation engine.
///
/// Owns a resolved model and a situation. Evaluating is lazy: only the rules
/// the requested value depends on are computed, and each at most once per
/// situation.
pub struct Engine {
    model: Arc<CompiledModel>,
    options: EngineOptions,
    situation: BTreeMap<DottedName, Expression>,
    cache: RefCell<HashMap<DottedName, Evaluation>>,
}

impl Engine {
    /// Compile a model given as a mapping of rule names to declarations.
    /// Every broken rule is reported at once.
    pub fn new(raw_rules: JsonValue) -> PublicodesResult<Self> {
        Self::with_options(raw_rules, EngineOptions::default())
    }

    pub fn with_options(raw_rules: JsonValue, options: EngineOptions) -> PublicodesResult<Self> {
        let rules = parse_rules(&raw_rules, &options.limits)?;
        let rules = resolve_rules(rules)?;
        let maps = ReferenceMaps::build(&rules);
        let replacements = ReplacementTable::new(&rules);
        debug!(rules = rules.len(), "model compiled");

        Ok(Self {
            model: Arc::new(CompiledModel {
                rules,
                maps,
                replacements,
            }),
            options,
            situation: BTreeMap::new(),
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Compile a model written in YAML
    pub fn from_yaml(source: &str) -> PublicodesResult<Self> {
        let raw: JsonValue =
            serde_yaml::from_str(source).map_err(|e| PublicodesError::RuleDefinition {
                rule: String::new(),
                key: String::new(),
                message: format!("invalid YAML: {}", e),
            })?;
        Self::new(raw)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.options.limits
    }

    /// Replace (or merge into) the current situation
    ///
    /// The situation is left unchanged when an answer is invalid.
    pub fn set_situation<I, K, V>(
        &mut self,
        entries: I,
        options: SituationOptions,
    ) -> PublicodesResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<SituationValue>,
    {
        let answers = compile_situation(
            entries,
            &self.model.rules,
            &self.model.replacements,
            &self.options.limits,
        )?;
        let mut situation = if options.keep_previous {
            self.situation.clone()
        } else {
            BTreeMap::new()
        };
        for (name, answer) in answers {
            match answer {
                Some(expression) => {
                    situation.insert(name, expression);
                }
                None => {
                    situation.remove(&name);
                }
            }
        }
        debug!(answers = situation.len(), "situation set");
        self.situation = situation;
        self.cache.get_mut().clear();
        Ok(())
    }

    pub fn situation(&self) -> &BTreeMap<DottedName, Expression> {
        &self.situation
    }

    /// Evaluate a rule name or a formula in the current situation
    pub fn evaluate(&self, expression: &str) -> PublicodesResult<EvaluatedNode> {
        self.evaluate_with(expression, EvaluationOptions::default())
    }

    pub fn evaluate_with(
        &self,
        expression: &str,
        options: EvaluationOptions,
    ) -> PublicodesResult<EvaluatedNode> {
        let expression = self.compile_expression(expression)?;

        let mut ctx = EvaluationContext::new(
            &self.model.rules,
            &self.situation,
            &self.options.limits,
        )
        .with_strict_units(self.options.strict_units);
        if options.use_cache {
            ctx = ctx.with_base_cache(std::mem::take(&mut *self.cache.borrow_mut()));
        }

        let result = evaluate_expression(&expression, &mut ctx);
        if options.use_cache {
            *self.cache.borrow_mut() = ctx.into_base_cache();
        }
        result.map(EvaluatedNode::from)
    }

    /// Parse and resolve an ad hoc expression from the root namespace
    fn compile_expression(&self, text: &str) -> PublicodesResult<Expression> {
        let root = DottedName::root();
        let mut expression = match parse_formula(text, &root, &self.options.limits) {
            Ok(expression) => expression,
            Err(error) => {
                // names of implicit rules are not valid formulas
                let name = DottedName::parse(text);
                if !self.model.rules.contains_key(&name) {
                    return Err(error);
                }
                Expression::reference(Reference::new(name))
            }
        };

        let mut resolver = ReferenceResolver::new(&self.model.rules);
        let mut errors = Vec::new();
        resolver.resolve_expression(&root, &mut expression, &mut errors);
        if !errors.is_empty() {
            return Err(PublicodesError::from_errors(errors));
        }
        self.model.replacements.rewrite(&root, &mut expression);
        Ok(expression)
    }

    pub fn get_rule(&self, name: &str) -> PublicodesResult<&Rule> {
        let dotted = DottedName::parse(name);
        self.model
            .rules
            .get(&dotted)
            .ok_or_else(|| PublicodesError::RuleNotFound(dotted.to_string()))
    }

    pub fn get_parsed_rules(&self) -> &BTreeMap<DottedName, Rule> {
        &self.model.rules
    }

    pub fn reference_maps(&self) -> &ReferenceMaps {
        &self.model.maps
    }

    /// A copy sharing the compiled model, with its own situation and cache
    pub fn shallow_copy(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            options: self.options.clone(),
            situation: self.situation.clone(),
            cache: RefCell::new(self.cache.borrow().clone()),
        }
    }

    /// Constant-fold the model
    pub fn fold(&self, options: FoldingOptions) -> PublicodesResult<FoldedRules> {
        fold_rules(
            &self.model.rules,
            &self.model.maps,
            &options,
            &self.options.limits,
            self.options.strict_units,
        )
    }
}
