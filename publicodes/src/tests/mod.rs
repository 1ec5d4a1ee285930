// Parser tests
mod expression_parsing;

// Evaluator tests
mod evaluation;
