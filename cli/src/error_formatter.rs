use ariadne::{Color, Label, Report, ReportKind, Source};
use publicodes::error::SyntaxErrorDetails;
use publicodes::PublicodesError;

/// Format a PublicodesError for the terminal, rendering syntax errors with Ariadne
pub fn format_error(error: &PublicodesError) -> String {
    match error {
        PublicodesError::Syntax(details) => format_syntax_error(details),
        PublicodesError::Multiple(errors) => {
            let mut result = format!("{} errors occurred:\n\n", errors.len());
            for error in errors {
                result.push_str(&format_error(error));
                result.push_str("\n\n");
            }
            result
        }
        PublicodesError::ResourceLimitExceeded {
            limit_name,
            limit_value,
            actual_value,
            suggestion,
        } => {
            format!(
                "Resource limit exceeded: {}\n  Limit: {}\n  Actual: {}\n  {}",
                limit_name, limit_value, actual_value, suggestion
            )
        }
        other => format!("Error: {}", other),
    }
}

fn format_syntax_error(details: &SyntaxErrorDetails) -> String {
    let mut output = Vec::new();
    let source_id = &details.rule;

    // Ariadne counts characters, pest counts bytes
    let to_char_offset = |byte: usize| {
        details
            .formula
            .get(..byte)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(byte)
    };
    let last = details.formula.chars().count().saturating_sub(1);
    let start = to_char_offset(details.span.start).min(last);
    let end = to_char_offset(details.span.end).clamp(start + 1, last + 1);

    let report = Report::build(ReportKind::Error, source_id, start)
        .with_message(format!(
            "Syntax error in rule '{}': {}",
            details.rule, details.message
        ))
        .with_label(
            Label::new((source_id, start..end))
                .with_message(&details.message)
                .with_color(Color::Red),
        );

    match report.finish().write(
        (source_id, Source::from(details.formula.as_str())),
        &mut output,
    ) {
        Ok(_) => String::from_utf8_lossy(&output).to_string(),
        Err(_) => format!("{}", PublicodesError::Syntax(Box::new(details.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use publicodes::Span;

    #[test]
    fn multiple_errors_are_listed() {
        let error = PublicodesError::Multiple(vec![
            PublicodesError::RuleNotFound("a".to_string()),
            PublicodesError::DivisionByZero {
                rule: Some("b".to_string()),
            },
        ]);
        let output = format_error(&error);
        assert!(output.starts_with("2 errors occurred"));
        assert!(output.contains("La règle 'a' n'existe pas"));
        assert!(output.contains("Division by zero in rule 'b'"));
    }

    #[test]
    fn syntax_errors_name_the_rule() {
        let error = PublicodesError::Syntax(Box::new(SyntaxErrorDetails {
            rule: "dépenses".to_string(),
            formula: "prix é +".to_string(),
            message: "expected an operand".to_string(),
            span: Span {
                start: 5,
                end: 7,
                line: 1,
                col: 6,
            },
        }));
        let output = format_error(&error);
        assert!(output.contains("dépenses"));
        assert!(output.contains("expected an operand"));
    }
}
