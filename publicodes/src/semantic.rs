use crate::ast::Span;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;

/// Hierarchical rule identifier, written `a . b . c`
///
/// Names order lexically by segment, so a namespace sorts right before its
/// children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DottedName {
    segments: Vec<String>,
}

impl DottedName {
    pub const SEPARATOR: &'static str = " . ";

    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Parse a name as written in a model: segments separated by `.`
    pub fn parse(text: &str) -> Self {
        let segments = text
            .split('.')
            .map(|segment| segment.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|segment| !segment.is_empty())
            .collect();
        Self { segments }
    }

    /// The empty name, i.e. the root namespace
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment of the name
    pub fn local_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<DottedName> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, segment: impl Into<String>) -> DottedName {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn join(&self, other: &DottedName) -> DottedName {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Whether `self` is `prefix` or lives in its namespace
    pub fn starts_with(&self, prefix: &DottedName) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Strict ancestors from the outermost namespace down to the direct parent.
    /// The root is not included.
    pub fn ancestors(&self) -> Vec<DottedName> {
        (1..self.segments.len())
            .map(|length| Self {
                segments: self.segments[..length].to_vec(),
            })
            .collect()
    }
}

impl fmt::Display for DottedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(Self::SEPARATOR))
    }
}

impl From<&str> for DottedName {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl Serialize for DottedName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A unit as two multisets of symbols, `numerators / denominators`
///
/// Symbols may repeat (`m.m` is a surface). The empty unit means "unitless".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Unit {
    pub numerators: Vec<String>,
    pub denominators: Vec<String>,
}

impl Unit {
    pub fn new(numerators: Vec<String>, denominators: Vec<String>) -> Self {
        Self {
            numerators,
            denominators,
        }
    }

    /// A unit made of a single symbol, e.g. `€`
    pub fn symbol(symbol: &str) -> Self {
        Self {
            numerators: vec![symbol.to_string()],
            denominators: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.numerators.is_empty() && self.denominators.is_empty()
    }

    /// Equality regardless of symbol order
    pub fn is_equivalent(&self, other: &Unit) -> bool {
        let sorted = |symbols: &[String]| {
            let mut symbols = symbols.to_vec();
            symbols.sort();
            symbols
        };
        sorted(&self.numerators) == sorted(&other.numerators)
            && sorted(&self.denominators) == sorted(&other.denominators)
    }

    /// Whether the unit is exactly `%`
    pub fn is_percent(&self) -> bool {
        self.denominators.is_empty() && self.numerators.len() == 1 && self.numerators[0] == "%"
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::parser::units::format_unit(self))
    }
}

impl Serialize for Unit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A value produced by evaluation
///
/// `NotApplicable` and `Missing` are the two non-values of the three-valued
/// logic: the first says the rule does not apply, the second that an input is
/// still unknown.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Decimal),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    /// One of the `possibilités` of a rule
    Enum(String),
    NotApplicable,
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Value::NotApplicable)
    }

    /// Neither missing nor not applicable
    pub fn is_defined(&self) -> bool {
        !self.is_missing() && !self.is_not_applicable()
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_zero())
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Text content of `Text` and `Enum` values
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::Enum(_) => "possibility",
            Value::NotApplicable => "not applicable",
            Value::Missing => "missing",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n.normalize()),
            Value::Text(s) | Value::Enum(s) => write!(f, "'{}'", s),
            Value::Boolean(true) => write!(f, "oui"),
            Value::Boolean(false) => write!(f, "non"),
            Value::Date(d) => write!(f, "{}", d.format("%d/%m/%Y")),
            Value::NotApplicable => write!(f, "non applicable"),
            Value::Missing => write!(f, "non défini"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Number(n) => match n.to_f64() {
                Some(float) => serializer.serialize_f64(float),
                None => serializer.serialize_str(&n.to_string()),
            },
            Value::Text(s) | Value::Enum(s) => serializer.serialize_str(s),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Date(d) => serializer.serialize_str(&d.format("%d/%m/%Y").to_string()),
            Value::NotApplicable | Value::Missing => serializer.serialize_none(),
        }
    }
}

/// A reference to a rule, as written and as resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// The name as written in the formula, relative to the enclosing rule
    pub name: DottedName,
    /// Fully qualified target, filled in by the resolver
    pub resolved: Option<DottedName>,
}

impl Reference {
    pub fn new(name: DottedName) -> Self {
        Self {
            name,
            resolved: None,
        }
    }

    pub fn resolved(name: DottedName) -> Self {
        Self {
            name: name.clone(),
            resolved: Some(name),
        }
    }

    /// The resolved name when known, the written one otherwise
    pub fn target(&self) -> &DottedName {
        self.resolved.as_ref().unwrap_or(&self.name)
    }
}

/// A compiled expression with its source location (when parsed from a formula)
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Option<Span>,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Option<Span>) -> Self {
        Self { kind, span }
    }

    pub fn constant(value: Value, unit: Unit) -> Self {
        Self::new(ExpressionKind::Constant(value, unit), None)
    }

    pub fn number(value: Decimal) -> Self {
        Self::constant(Value::Number(value), Unit::default())
    }

    pub fn boolean(value: bool) -> Self {
        Self::constant(Value::Boolean(value), Unit::default())
    }

    pub fn reference(reference: Reference) -> Self {
        Self::new(ExpressionKind::Reference(reference), None)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExpressionKind::Constant(..))
    }

    /// Visit every direct subexpression
    pub fn children(&self) -> Vec<&Expression> {
        use ExpressionKind::*;
        match &self.kind {
            Constant(..) | Reference(_) | Input(_) => Vec::new(),
            Binary { left, right, .. } => vec![left, right],
            Unary { operand, .. } => vec![operand],
            Sum(items) | Product(items) | OneOf(items) | AllOf(items) => items.iter().collect(),
            Extremum { items, .. } => items.iter().collect(),
            Condition {
                condition,
                consequence,
                alternative,
            } => vec![condition, consequence, alternative],
            Bareme(scale) | Grille(scale) => {
                let mut children: Vec<&Expression> = vec![&scale.base, &scale.multiplier];
                for tranche in &scale.tranches {
                    if let Some(ceiling) = &tranche.ceiling {
                        children.push(ceiling);
                    }
                    children.push(&tranche.amount);
                }
                children
            }
            Round {
                value, precision, ..
            } => vec![value, precision],
            Clamp { value, limit, .. } => vec![value, limit],
            Abatement { value, abatement } => vec![value, abatement],
            Context { overrides, value } => {
                let mut children: Vec<&Expression> = overrides.iter().map(|(_, e)| e).collect();
                children.push(value);
                children
            }
            Replace {
                original,
                candidates,
            } => {
                let mut children: Vec<&Expression> = vec![original];
                children.extend(candidates.iter());
                children
            }
            DefaultValue { value, default } => vec![value, default],
            Duration { from, to, .. } => vec![from, to],
            Predicate { operand, .. } => vec![operand],
            Gate {
                condition, value, ..
            } => vec![condition, value],
            UnitConversion { value, .. } => vec![value],
            CircularResolution { value, .. } => vec![value],
        }
    }

    /// Mutable counterpart of [`Expression::children`]
    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        use ExpressionKind::*;
        match &mut self.kind {
            Constant(..) | Reference(_) | Input(_) => Vec::new(),
            Binary { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Unary { operand, .. } => vec![operand.as_mut()],
            Sum(items) | Product(items) | OneOf(items) | AllOf(items) => {
                items.iter_mut().collect()
            }
            Extremum { items, .. } => items.iter_mut().collect(),
            Condition {
                condition,
                consequence,
                alternative,
            } => vec![
                condition.as_mut(),
                consequence.as_mut(),
                alternative.as_mut(),
            ],
            Bareme(scale) | Grille(scale) => {
                let mut children: Vec<&mut Expression> =
                    vec![scale.base.as_mut(), scale.multiplier.as_mut()];
                for tranche in &mut scale.tranches {
                    if let Some(ceiling) = &mut tranche.ceiling {
                        children.push(ceiling);
                    }
                    children.push(&mut tranche.amount);
                }
                children
            }
            Round {
                value, precision, ..
            } => vec![value.as_mut(), precision.as_mut()],
            Clamp { value, limit, .. } => vec![value.as_mut(), limit.as_mut()],
            Abatement { value, abatement } => vec![value.as_mut(), abatement.as_mut()],
            Context { overrides, value } => {
                let mut children: Vec<&mut Expression> =
                    overrides.iter_mut().map(|(_, e)| e).collect();
                children.push(value.as_mut());
                children
            }
            Replace {
                original,
                candidates,
            } => {
                let mut children: Vec<&mut Expression> = vec![original.as_mut()];
                children.extend(candidates.iter_mut());
                children
            }
            DefaultValue { value, default } => vec![value.as_mut(), default.as_mut()],
            Duration { from, to, .. } => vec![from.as_mut(), to.as_mut()],
            Predicate { operand, .. } => vec![operand.as_mut()],
            Gate {
                condition, value, ..
            } => vec![condition.as_mut(), value.as_mut()],
            UnitConversion { value, .. } => vec![value.as_mut()],
            CircularResolution { value, .. } => vec![value.as_mut()],
        }
    }
}

/// The kind of expression
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Constant(Value, Unit),
    Reference(Reference),
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Sum(Vec<Expression>),
    Product(Vec<Expression>),
    /// `si … alors … sinon …`; `variations` lowers to a chain of these
    Condition {
        condition: Box<Expression>,
        consequence: Box<Expression>,
        alternative: Box<Expression>,
    },
    Bareme(Scale),
    Grille(Scale),
    Round {
        mode: RoundingMode,
        value: Box<Expression>,
        precision: Box<Expression>,
    },
    /// `plancher` (lower bound) and `plafond` (upper bound)
    Clamp {
        bound: BoundKind,
        value: Box<Expression>,
        limit: Box<Expression>,
    },
    Abatement {
        value: Box<Expression>,
        abatement: Box<Expression>,
    },
    Extremum {
        kind: ExtremumKind,
        items: Vec<Expression>,
    },
    Context {
        overrides: Vec<(Reference, Expression)>,
        value: Box<Expression>,
    },
    /// A reference subject to `remplace` directives. Candidates are ordered by
    /// decreasing priority; the first applicable one wins.
    Replace {
        original: Box<Expression>,
        candidates: Vec<Expression>,
    },
    DefaultValue {
        value: Box<Expression>,
        default: Box<Expression>,
    },
    OneOf(Vec<Expression>),
    AllOf(Vec<Expression>),
    Duration {
        from: Box<Expression>,
        to: Box<Expression>,
        unit: Unit,
    },
    Predicate {
        kind: PredicateKind,
        operand: Box<Expression>,
    },
    /// `applicable si` / `non applicable si`
    Gate {
        kind: GateKind,
        condition: Box<Expression>,
        value: Box<Expression>,
    },
    UnitConversion {
        value: Box<Expression>,
        unit: Unit,
    },
    /// Value of a rule without formula: answered by the situation or missing
    Input(DottedName),
    CircularResolution {
        rule: DottedName,
        value: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Power,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::FloorDivide => "//",
            BinaryOperator::Power => "**",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "et",
            BinaryOperator::Or => "ou",
        }
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => 3,
            BinaryOperator::Add | BinaryOperator::Subtract => 4,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::FloorDivide => 5,
            BinaryOperator::Power => 6,
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.precedence() == 3
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOperator {
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RoundingMode {
    Nearest,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BoundKind {
    /// `plancher`
    Lower,
    /// `plafond`
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExtremumKind {
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PredicateKind {
    IsDefined,
    IsMissing,
    IsApplicable,
    IsNotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GateKind {
    ApplicableIf,
    NotApplicableIf,
}

/// Shared shape of `barème` and `grille`
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    pub base: Box<Expression>,
    pub multiplier: Box<Expression>,
    pub tranches: Vec<Tranche>,
}

/// A bracket: `taux` (barème) or `montant` (grille) up to `plafond × multiplicateur`.
/// Only the last tranche may be unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Tranche {
    pub ceiling: Option<Expression>,
    pub amount: Expression,
}

/// A `remplace` directive declared by a rule
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub target: Reference,
    /// Rule whose value replaces the target: the declaring rule, or the
    /// implicit rule created for `par`
    pub by: DottedName,
    pub priority: Decimal,
    pub within: Vec<Reference>,
    pub except: Vec<Reference>,
}

/// A compiled rule
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: DottedName,
    /// The declaration as found in the model
    pub raw: serde_json::Value,
    pub title: Option<String>,
    pub description: Option<String>,
    pub question: Option<String>,
    pub unit: Option<Unit>,
    pub private: bool,
    /// Created by the compiler (`par` in `remplace`)
    pub implicit: bool,
    pub has_default: bool,
    pub possibilities: Option<Vec<String>>,
    pub replacements: Vec<Replacement>,
    pub body: Expression,
    /// Declaration order, used to break ties
    pub order: usize,
    /// Set by the folding pass
    pub folded: bool,
}

impl Rule {
    /// Top-level `applicable si` / `non applicable si` conditions of the body
    pub fn gates(&self) -> Vec<(GateKind, &Expression)> {
        let mut gates = Vec::new();
        let mut current = &self.body;
        loop {
            match &current.kind {
                ExpressionKind::Gate {
                    kind,
                    condition,
                    value,
                } => {
                    gates.push((*kind, condition.as_ref()));
                    current = value;
                }
                ExpressionKind::CircularResolution { value, .. } => current = value,
                _ => return gates,
            }
        }
    }

    /// The body below the top-level gates
    pub fn ungated_body(&self) -> &Expression {
        let mut current = &self.body;
        loop {
            match &current.kind {
                ExpressionKind::Gate { value, .. } => current = value,
                ExpressionKind::CircularResolution { value, .. } => current = value,
                _ => return current,
            }
        }
    }

    /// Whether the rule is a user input: no formula, or a question to ask
    pub fn is_input(&self) -> bool {
        self.question.is_some()
            || self.has_default
            || matches!(self.ungated_body().kind, ExpressionKind::Input(_))
    }
}
