mod error_formatter;
mod formatter;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use formatter::Formatter;
use publicodes::{DottedName, Engine, FoldingOptions, PublicodesError, SituationOptions};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extensions of the rule files loaded from a model directory
const RULE_FILE_EXTENSIONS: [&str; 4] = ["yaml", "yml", "publicodes", "json"];

#[derive(Parser)]
#[command(name = "publicodes")]
#[command(about = "Compile and evaluate Publicodes models.")]
#[command(
    long_about = "Publicodes is a declarative language for public-interest computations (taxes, benefits, carbon footprints).\nThe CLI compiles a model directory into an optimized rule file, evaluates rules against a situation, or lists the rules of a model."
)]
#[command(version)]
struct Cli {
    /// Print engine diagnostics (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a model and write its constant-folded rules as JSON
    ///
    /// Loads every .yaml, .yml, .publicodes and .json file under the model directory,
    /// reports every rule definition error, folds the rules that do not depend on the
    /// situation and writes the remaining rules to the output file.
    Compile {
        /// Directory containing the rule files
        model_dir: PathBuf,
        /// Path of the JSON file to write
        output_json: PathBuf,
        /// Rules to keep even when every reference to them was folded
        #[arg(short, long = "keep", value_name = "RULE")]
        keep: Vec<String>,
    },
    /// Evaluate a rule or a formula
    ///
    /// Examples:
    ///   publicodes evaluate model "impôt"
    ///   publicodes evaluate model "impôt" "revenu=40000 €/an"
    ///   publicodes evaluate model "revenu * 10 %" revenu=2000 --json
    Evaluate {
        /// Directory containing the rule files
        model_dir: PathBuf,
        /// Rule name or formula to evaluate
        expression: String,
        /// Situation answers (format: rule=value)
        situation: Vec<String>,
        /// Output the result as JSON
        #[arg(long)]
        json: bool,
        /// Output the value only (for piping to other tools)
        #[arg(short, long)]
        raw: bool,
    },
    /// List the rules of a model
    List {
        /// Directory containing the rule files
        model_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Compile {
            model_dir,
            output_json,
            keep,
        } => compile_command(model_dir, output_json, keep),
        Commands::Evaluate {
            model_dir,
            expression,
            situation,
            json,
            raw,
        } => evaluate_command(model_dir, expression, situation, *json, *raw),
        Commands::List { model_dir } => list_command(model_dir),
    };

    if let Err(e) = result {
        if let Some(publicodes_err) = e.downcast_ref::<PublicodesError>() {
            eprintln!("{}", error_formatter::format_error(publicodes_err));
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn compile_command(model_dir: &Path, output_json: &Path, keep: &[String]) -> Result<()> {
    let model = load_model(model_dir)?;
    let engine = Engine::new(model.rules)?;

    let options = FoldingOptions {
        keep: keep.iter().map(|name| DottedName::parse(name)).collect(),
    };
    let folded = engine.fold(options)?;

    let output = serde_json::to_string_pretty(&folded.to_json())?;
    fs::write(output_json, output)
        .with_context(|| format!("cannot write {}", output_json.display()))?;

    let formatter = Formatter::default();
    print!(
        "{}",
        formatter.format_compile_summary(
            model.file_count,
            folded.rules().len(),
            folded.rules().values().filter(|rule| rule.folded).count(),
            folded.removed().len(),
        )
    );
    Ok(())
}

fn evaluate_command(
    model_dir: &Path,
    expression: &str,
    situation: &[String],
    json: bool,
    raw: bool,
) -> Result<()> {
    let model = load_model(model_dir)?;
    let mut engine = Engine::new(model.rules)?;

    if !situation.is_empty() {
        let answers = situation
            .iter()
            .map(|answer| parse_answer(answer))
            .collect::<Result<Vec<_>>>()?;
        engine.set_situation(answers, SituationOptions::default())?;
    }

    let node = engine.evaluate(expression)?;
    let formatter = Formatter::default();
    if json {
        println!("{}", serde_json::to_string_pretty(&node)?);
    } else if raw {
        print!("{}", formatter.format_raw(&node));
    } else {
        print!("{}", formatter.format_evaluation(expression, &node));
    }
    Ok(())
}

fn list_command(model_dir: &Path) -> Result<()> {
    let model = load_model(model_dir)?;
    let engine = Engine::new(model.rules)?;

    let formatter = Formatter::default();
    print!("{}", formatter.format_rule_list(engine.get_parsed_rules()));
    Ok(())
}

/// Rule declarations merged from every rule file of a directory
struct Model {
    rules: JsonValue,
    file_count: usize,
}

/// Load and merge all rule files under `model_dir`, in path order
fn load_model(model_dir: &Path) -> Result<Model> {
    if !model_dir.is_dir() {
        bail!("model directory '{}' not found", model_dir.display());
    }

    let mut rules = Map::new();
    let mut origins: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut file_count = 0;

    for entry in WalkDir::new(model_dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let is_rule_file = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|extension| RULE_FILE_EXTENSIONS.contains(&extension));
        if !entry.file_type().is_file() || !is_rule_file {
            continue;
        }

        let declarations = read_rule_file(path)?;
        file_count += 1;
        debug!(file = %path.display(), rules = declarations.len(), "loaded rule file");

        for (name, declaration) in declarations {
            if let Some(previous) = origins.get(&name) {
                bail!(
                    "rule '{}' is defined in both {} and {}",
                    name,
                    previous.display(),
                    path.display()
                );
            }
            origins.insert(name.clone(), path.to_path_buf());
            rules.insert(name, declaration);
        }
    }

    Ok(Model {
        rules: JsonValue::Object(rules),
        file_count,
    })
}

fn read_rule_file(path: &Path) -> Result<Map<String, JsonValue>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let value: JsonValue = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("invalid YAML in {}", path.display()))?
    };

    match value {
        JsonValue::Object(declarations) => Ok(declarations),
        JsonValue::Null => Ok(Map::new()),
        _ => bail!("{} must map rule names to declarations", path.display()),
    }
}

/// Parse a `rule=value` situation answer
fn parse_answer(answer: &str) -> Result<(String, String)> {
    match answer.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("invalid situation answer '{}' (expected rule=value)", answer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_split_on_the_first_equal_sign() {
        assert_eq!(
            parse_answer("contrat = 'CDD'").unwrap(),
            ("contrat".to_string(), "'CDD'".to_string())
        );
        assert_eq!(
            parse_answer("a=b = c").unwrap(),
            ("a".to_string(), "b = c".to_string())
        );
        assert!(parse_answer("revenu").is_err());
        assert!(parse_answer("=3").is_err());
    }
}
