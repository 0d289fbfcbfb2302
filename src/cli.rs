//! CLI definition and dispatch.

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::codegen::{JavaScriptGenerator, Mql5Generator, PythonGenerator};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_file_adapter::JsonFileAdapter;
use crate::domain::builder::parse_condition;
use crate::domain::compiler::{self, CompileOptions};
use crate::domain::config_validation::CompilerSettings;
use crate::domain::crossover;
use crate::domain::error::StratforgeError;
use crate::domain::expression::{Comparison, Condition};
use crate::domain::registry::IndicatorRegistry;
use crate::ports::codegen_port::{CodeGenerator, Target};
use crate::ports::document_port::DocumentPort;

#[derive(Parser, Debug)]
#[command(
    name = "stratforge",
    about = "Compile declarative trading strategies into executable source"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build, validate and generate source for one target
    Compile {
        #[arg(short, long)]
        document: PathBuf,
        /// javascript, python or mql5 (overrides [compiler] target)
        #[arg(short, long)]
        target: Option<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Indicator registry JSON (defaults to the built-in set)
        #[arg(short, long)]
        registry: Option<PathBuf>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Refuse generation when validation reports warnings
        #[arg(long)]
        strict: bool,
        /// Keep constant sub-expressions unfolded
        #[arg(long)]
        no_fold: bool,
        /// Prefix the output with a generation timestamp comment
        #[arg(long)]
        stamp_header: bool,
    },
    /// Build and validate a strategy document
    Validate {
        #[arg(short, long)]
        document: PathBuf,
        #[arg(short, long)]
        registry: Option<PathBuf>,
        /// Print the validation result as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// List the available code generation targets
    Targets,
    /// Synthesize a crossover from two adjacent comparisons
    DetectCrossover {
        /// Comparison at the current sample, as JSON
        #[arg(long)]
        current: String,
        /// Comparison at the previous sample, as JSON
        #[arg(long)]
        previous: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Compile {
            document,
            target,
            config,
            registry,
            output,
            strict,
            no_fold,
            stamp_header,
        } => {
            let mut settings = match load_settings(config.as_ref()) {
                Ok(s) => s,
                Err(code) => return code,
            };
            if strict {
                settings.strict = true;
            }
            if no_fold {
                settings.fold_constants = false;
            }
            if stamp_header {
                settings.stamp_header = true;
            }
            if registry.is_some() {
                settings.registry = registry;
            }
            run_compile(&document, target.as_deref(), &settings, output.as_ref())
        }
        Command::Validate {
            document,
            registry,
            json,
        } => run_validate(&document, registry.as_deref(), json),
        Command::Targets => run_targets(),
        Command::DetectCrossover { current, previous } => run_detect_crossover(&current, &previous),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = match e {
            StratforgeError::Io(io) => StratforgeError::ConfigParse {
                file: path.display().to_string(),
                reason: io.to_string(),
            },
            other => other,
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Settings from the config file, or defaults when none is given.
pub fn load_settings(path: Option<&PathBuf>) -> Result<CompilerSettings, ExitCode> {
    let Some(path) = path else {
        return Ok(CompilerSettings::default());
    };
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    CompilerSettings::from_config(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// The built-in registry unless a file is given.
pub fn load_registry(path: Option<&Path>) -> Result<IndicatorRegistry, StratforgeError> {
    match path {
        Some(p) => JsonFileAdapter::default().read_registry(&p.to_string_lossy()),
        None => Ok(IndicatorRegistry::builtin()),
    }
}

/// Picks the target: the flag wins over `[compiler] target`.
pub fn resolve_target(
    flag: Option<&str>,
    settings: &CompilerSettings,
) -> Result<Target, StratforgeError> {
    match (flag, settings.target) {
        (Some(name), _) => name.parse(),
        (None, Some(target)) => Ok(target),
        (None, None) => Err(StratforgeError::ConfigMissing {
            section: "compiler".to_string(),
            key: "target".to_string(),
        }),
    }
}

/// Generator for `target` configured from `settings`.
pub fn configured_generator(target: Target, settings: &CompilerSettings) -> Box<dyn CodeGenerator> {
    match target {
        Target::JavaScript => Box::new(JavaScriptGenerator::new(
            settings.javascript_class_suffix.clone(),
        )),
        Target::Python => Box::new(PythonGenerator::new(
            settings.python_class_suffix.clone(),
            settings.python_talib_module.clone(),
        )),
        Target::Mql5 => Box::new(Mql5Generator::new(
            settings.mql5_magic_number,
            settings.mql5_deviation_points,
        )),
    }
}

/// One comment line naming the tool and the UTC generation time.
pub fn stamp_header(target: Target, source: &str) -> String {
    format!(
        "{} generated by stratforge at {}\n{}",
        target.comment_prefix(),
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        source
    )
}

fn run_compile(
    document_path: &Path,
    target_flag: Option<&str>,
    settings: &CompilerSettings,
    output: Option<&PathBuf>,
) -> ExitCode {
    match compile_to_string(document_path, target_flag, settings) {
        Ok(source) => match output {
            Some(path) => match fs::write(path, &source) {
                Ok(()) => {
                    eprintln!("Wrote {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    let err = StratforgeError::from(e);
                    eprintln!("error: {err}");
                    (&err).into()
                }
            },
            None => {
                print!("{}", source);
                ExitCode::SUCCESS
            }
        },
        Err(e) => {
            eprintln!("error: {e}");
            match &e {
                StratforgeError::InvalidStrategy { errors: issues }
                | StratforgeError::StrictWarnings { warnings: issues } => {
                    for issue in issues {
                        eprintln!("  {}", issue);
                    }
                }
                _ => {}
            }
            (&e).into()
        }
    }
}

/// The whole compile command short of writing the result.
pub fn compile_to_string(
    document_path: &Path,
    target_flag: Option<&str>,
    settings: &CompilerSettings,
) -> Result<String, StratforgeError> {
    let target = resolve_target(target_flag, settings)?;
    let registry = load_registry(settings.registry.as_deref())?;
    let document = JsonFileAdapter::default().read_document(&document_path.to_string_lossy())?;
    let generator = configured_generator(target, settings);
    let options = CompileOptions {
        strict: settings.strict,
        fold_constants: settings.fold_constants,
    };
    let compilation = compiler::compile(&document, &registry, generator.as_ref(), options)?;
    for warning in &compilation.validation.warnings {
        eprintln!("{}", warning);
    }
    info!(target = %target, "compilation finished");
    if settings.stamp_header {
        Ok(stamp_header(target, &compilation.source))
    } else {
        Ok(compilation.source)
    }
}

fn run_validate(document_path: &Path, registry_path: Option<&Path>, json: bool) -> ExitCode {
    eprintln!("Validating strategy: {}", document_path.display());
    let result = load_registry(registry_path).and_then(|registry| {
        let document =
            JsonFileAdapter::default().read_document(&document_path.to_string_lossy())?;
        compiler::check(&document, &registry)
    });
    let (strategy, validation) = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if json {
        match serde_json::to_string_pretty(&validation) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(1);
            }
        }
    } else {
        eprintln!("\nStrategy: {}", strategy.name.as_deref().unwrap_or("unnamed"));
        eprintln!(
            "  {} data sources, {} rules, {} actions, {} position limits",
            strategy.data_sources.len(),
            strategy.rules.len(),
            strategy.actions.len(),
            strategy.position_limits.len()
        );
        for (i, rule) in strategy.rules.iter().enumerate() {
            eprintln!("  rule {}: {}", i + 1, rule.condition);
        }
        for issue in validation.errors.iter().chain(&validation.warnings) {
            eprintln!("  {}", issue);
        }
    }

    if validation.valid {
        eprintln!("\nStrategy is valid");
        ExitCode::SUCCESS
    } else {
        let err = StratforgeError::InvalidStrategy {
            errors: validation.errors,
        };
        eprintln!("\nerror: {err}");
        (&err).into()
    }
}

fn run_targets() -> ExitCode {
    for target in Target::ALL {
        println!("{}\t.{}", target.name(), target.file_extension());
    }
    ExitCode::SUCCESS
}

fn parse_comparison(flag: &str, raw: &str) -> Result<Comparison, StratforgeError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| StratforgeError::DocumentParse {
            source_name: flag.to_string(),
            reason: e.to_string(),
        })?;
    match parse_condition(&value)? {
        Condition::Comparison(cmp) => Ok(cmp),
        other => Err(StratforgeError::DocumentParse {
            source_name: flag.to_string(),
            reason: format!("expected a single comparison, found {}", other),
        }),
    }
}

fn run_detect_crossover(current: &str, previous: &str) -> ExitCode {
    let parsed = parse_comparison("--current", current)
        .and_then(|c| parse_comparison("--previous", previous).map(|p| (c, p)));
    let (current, previous) = match parsed {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    match crossover::detect(&current, &previous) {
        Some(cross) => println!("{}", Condition::Crossover(cross)),
        None => println!("none"),
    }
    ExitCode::SUCCESS
}
