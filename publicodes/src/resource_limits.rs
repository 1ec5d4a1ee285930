/// Resource limits to keep hostile models from exhausting the host
///
/// These limits protect against malicious inputs while being generous enough
/// for real models (the French social contributions model is the benchmark).
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum size of a single formula in bytes
    /// Real usage: ~200 bytes, Limit: 64KB
    pub max_formula_bytes: usize,

    /// Maximum formula nesting depth (parentheses, nested operators)
    /// Real usage: ~5 levels, Limit: 100
    pub max_expression_depth: usize,

    /// Maximum depth of nested rule evaluations
    /// Real usage: ~40 levels, Limit: 512
    pub max_evaluation_depth: usize,

    /// Maximum number of iterations when solving a circular reference
    pub max_circular_iterations: usize,

    /// Maximum number of rules in a model
    /// Real usage: ~3000 rules, Limit: 100 000
    pub max_rules: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_formula_bytes: 64 * 1024, // 64 KB
            max_expression_depth: 100,
            max_evaluation_depth: 512,
            max_circular_iterations: 64,
            max_rules: 100_000,
        }
    }
}
