//! CLI integration tests for the compile, validate and crossover commands.
//!
//! Tests cover:
//! - Settings loading from real INI files on disk
//! - Target resolution between flag and config
//! - compile_to_string against each target, with and without folding
//! - Exit codes of the dispatched subcommands

mod common;

use clap::Parser;
use common::*;
use serde_json::json;
use std::process::ExitCode;
use stratforge::cli::{self, Cli};
use stratforge::domain::config_validation::CompilerSettings;
use stratforge::domain::error::StratforgeError;
use stratforge::ports::codegen_port::Target;
use tempfile::TempDir;

const FULL_INI: &str = r#"
[compiler]
target = python
strict = no
stamp_header = false
fold_constants = true

[mql5]
magic_number = 777
deviation_points = 5

[javascript]
class_suffix = Bot

[python]
class_suffix = Algo
talib_module = vendor.talib
"#;

// ExitCode doesn't implement PartialEq, so compare the debug format
fn assert_exit(code: ExitCode, expected: u8) {
    assert_eq!(
        format!("{:?}", code),
        format!("{:?}", ExitCode::from(expected)),
        "unexpected exit code"
    );
}

fn run(args: &[&str]) -> ExitCode {
    let mut argv = vec!["stratforge"];
    argv.extend_from_slice(args);
    cli::run(Cli::parse_from(argv))
}

fn write_document(dir: &TempDir, doc: &serde_json::Value) -> String {
    write_temp(dir, "strategy.json", &doc.to_string())
        .to_string_lossy()
        .into_owned()
}

mod settings_loading {
    use super::*;

    #[test]
    fn no_config_gives_defaults() {
        let settings = cli::load_settings(None).unwrap();
        assert_eq!(settings.target, None);
        assert_eq!(settings.mql5_magic_number, 20240);
        assert!(settings.fold_constants);
    }

    #[test]
    fn full_config_is_read() {
        let dir = TempDir::new().unwrap();
        let path = write_temp(&dir, "stratforge.ini", FULL_INI);
        let settings = cli::load_settings(Some(&path)).unwrap();
        assert_eq!(settings.target, Some(Target::Python));
        assert!(!settings.strict);
        assert_eq!(settings.mql5_magic_number, 777);
        assert_eq!(settings.mql5_deviation_points, 5);
        assert_eq!(settings.javascript_class_suffix, "Bot");
        assert_eq!(settings.python_class_suffix, "Algo");
        assert_eq!(settings.python_talib_module, "vendor.talib");
    }

    #[test]
    fn missing_config_file_exits_with_config_code() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.ini");
        assert_exit(cli::load_settings(Some(&path)).unwrap_err(), 2);
    }

    #[test]
    fn invalid_value_exits_with_config_code() {
        let dir = TempDir::new().unwrap();
        let path = write_temp(&dir, "bad.ini", "[mql5]\nmagic_number = -1\n");
        assert_exit(cli::load_settings(Some(&path)).unwrap_err(), 2);
    }
}

mod target_resolution {
    use super::*;

    #[test]
    fn flag_overrides_config() {
        let settings = CompilerSettings {
            target: Some(Target::Python),
            ..CompilerSettings::default()
        };
        assert_eq!(cli::resolve_target(Some("mql5"), &settings).unwrap(), Target::Mql5);
        assert_eq!(cli::resolve_target(None, &settings).unwrap(), Target::Python);
    }

    #[test]
    fn absent_target_is_config_missing() {
        let err = cli::resolve_target(None, &CompilerSettings::default()).unwrap_err();
        assert!(matches!(err, StratforgeError::ConfigMissing { ref key, .. } if key == "target"));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = cli::resolve_target(Some("cobol"), &CompilerSettings::default()).unwrap_err();
        assert!(matches!(err, StratforgeError::UnknownTarget { ref name } if name == "cobol"));
    }
}

mod compile_to_string {
    use super::*;

    #[test]
    fn configured_suffixes_reach_the_output() {
        let dir = TempDir::new().unwrap();
        let path = write_temp(&dir, "strategy.json", &golden_cross_document().to_string());
        let settings = CompilerSettings {
            javascript_class_suffix: "Bot".into(),
            python_class_suffix: "Algo".into(),
            python_talib_module: "vendor.talib".into(),
            ..CompilerSettings::default()
        };

        let js = cli::compile_to_string(&path, Some("javascript"), &settings).unwrap();
        assert!(js.contains("class GoldenCrossBot {"));

        let py = cli::compile_to_string(&path, Some("python"), &settings).unwrap();
        assert!(py.contains("class GoldenCrossAlgo:"));
        assert!(py.contains("import vendor.talib as talib"));
    }

    #[test]
    fn stamp_header_prefixes_one_comment_line() {
        let dir = TempDir::new().unwrap();
        let path = write_temp(&dir, "strategy.json", &golden_cross_document().to_string());
        let plain = CompilerSettings::default();
        let stamped = CompilerSettings {
            stamp_header: true,
            ..CompilerSettings::default()
        };

        let without = cli::compile_to_string(&path, Some("python"), &plain).unwrap();
        let with = cli::compile_to_string(&path, Some("python"), &stamped).unwrap();
        let (first, rest) = with.split_once('\n').unwrap();
        assert!(first.starts_with("# generated by stratforge at "));
        assert!(first.ends_with('Z'));
        assert_eq!(rest, without);
    }

    #[test]
    fn stamp_header_uses_target_comment_syntax() {
        let stamped = cli::stamp_header(Target::Mql5, "int x;\n");
        assert!(stamped.starts_with("// generated by stratforge at "));
        assert!(stamped.ends_with("\nint x;\n"));
    }

    #[test]
    fn folding_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let mut doc = golden_cross_document();
        doc["actions"][1]["order"]["limit_price"] = json!({"operator": "*", "operandA": 2, "operandB": 3});
        let path = write_temp(&dir, "strategy.json", &doc.to_string());

        let folded = cli::compile_to_string(&path, Some("js"), &CompilerSettings::default()).unwrap();
        assert!(folded.contains("limitPrice: 6.0"));

        let settings = CompilerSettings {
            fold_constants: false,
            ..CompilerSettings::default()
        };
        let unfolded = cli::compile_to_string(&path, Some("js"), &settings).unwrap();
        assert!(unfolded.contains("limitPrice: (2.0 * 3.0)"));
    }

    #[test]
    fn strict_mode_turns_warnings_into_failure() {
        let dir = TempDir::new().unwrap();
        let mut doc = golden_cross_document();
        doc["data_sources"].as_array_mut().unwrap().push(json!({
            "id": "unused", "indicator_type": "SMA", "symbol": "TSLA",
            "timeframe": {"period": "day", "length": 1}, "params": {"period": 10}
        }));
        let path = write_temp(&dir, "strategy.json", &doc.to_string());

        assert!(cli::compile_to_string(&path, Some("python"), &CompilerSettings::default()).is_ok());

        let strict = CompilerSettings {
            strict: true,
            ..CompilerSettings::default()
        };
        match cli::compile_to_string(&path, Some("python"), &strict).unwrap_err() {
            StratforgeError::StrictWarnings { warnings } => {
                assert_eq!(warnings.len(), 1);
                assert_eq!(warnings[0].message, "data source 'unused' is never referenced");
            }
            other => panic!("expected StrictWarnings, got {other:?}"),
        }
    }

    #[test]
    fn custom_registry_without_ema_rejects_strategy() {
        let dir = TempDir::new().unwrap();
        let path = write_temp(&dir, "strategy.json", &golden_cross_document().to_string());
        let registry = write_temp(
            &dir,
            "indicators.json",
            r#"{"rsi": {"inputs": [{"name": "period", "type": "int", "default": 14}], "outputs": [{"name": "value"}]}}"#,
        );
        let settings = CompilerSettings {
            registry: Some(registry),
            ..CompilerSettings::default()
        };
        match cli::compile_to_string(&path, Some("javascript"), &settings).unwrap_err() {
            StratforgeError::InvalidStrategy { errors } => {
                let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
                assert_eq!(
                    messages,
                    vec![
                        "data source 'ema_50' uses unknown indicator_type 'EMA'",
                        "data source 'ema_200' uses unknown indicator_type 'EMA'",
                    ]
                );
            }
            other => panic!("expected InvalidStrategy, got {other:?}"),
        }
    }
}

mod commands {
    use super::*;

    #[test]
    fn compile_writes_output_file() {
        let dir = TempDir::new().unwrap();
        let doc = write_document(&dir, &golden_cross_document());
        let out = dir.path().join("GoldenCross.mq5");
        let out_arg = out.to_string_lossy().into_owned();

        assert_exit(run(&["compile", "-d", &doc, "-t", "mql5", "-o", &out_arg]), 0);
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("int OnInit()"));
        assert!(written.contains("void OnTick()"));
    }

    #[test]
    fn compile_without_target_is_config_error() {
        let dir = TempDir::new().unwrap();
        let doc = write_document(&dir, &golden_cross_document());
        assert_exit(run(&["compile", "-d", &doc]), 2);
    }

    #[test]
    fn compile_target_from_config() {
        let dir = TempDir::new().unwrap();
        let doc = write_document(&dir, &golden_cross_document());
        let ini = write_temp(&dir, "stratforge.ini", "[compiler]\ntarget = javascript\n");
        let out = dir.path().join("out.js");
        let ini_arg = ini.to_string_lossy().into_owned();
        let out_arg = out.to_string_lossy().into_owned();

        assert_exit(run(&["compile", "-d", &doc, "-c", &ini_arg, "-o", &out_arg]), 0);
        assert!(std::fs::read_to_string(&out).unwrap().contains("module.exports"));
    }

    #[test]
    fn unsupported_construct_exits_with_codegen_code() {
        let dir = TempDir::new().unwrap();
        let mut doc = golden_cross_document();
        doc["data_sources"][2]["indicator_type"] = json!("VWAP");
        let doc = write_document(&dir, &doc);
        assert_exit(run(&["compile", "-d", &doc, "-t", "python"]), 5);
    }

    #[test]
    fn unknown_target_exits_with_codegen_code() {
        let dir = TempDir::new().unwrap();
        let doc = write_document(&dir, &golden_cross_document());
        assert_exit(run(&["compile", "-d", &doc, "-t", "rust"]), 5);
    }

    #[test]
    fn validate_reports_invalid_strategy() {
        let dir = TempDir::new().unwrap();
        let mut doc = golden_cross_document();
        doc["rules"][0]["then"] = json!(["missing_action"]);
        let doc = write_document(&dir, &doc);
        assert_exit(run(&["validate", "-d", &doc]), 4);
    }

    #[test]
    fn validate_accepts_good_strategy() {
        let dir = TempDir::new().unwrap();
        let doc = write_document(&dir, &golden_cross_document());
        assert_exit(run(&["validate", "-d", &doc, "--json"]), 0);
    }

    #[test]
    fn unrecognized_condition_exits_with_build_code() {
        let dir = TempDir::new().unwrap();
        let mut doc = golden_cross_document();
        doc["rules"][0]["condition"] = json!({"xor": []});
        let doc = write_document(&dir, &doc);
        assert_exit(run(&["validate", "-d", &doc]), 3);
    }

    #[test]
    fn missing_document_exits_with_io_code() {
        let dir = TempDir::new().unwrap();
        let absent = dir.path().join("absent.json").to_string_lossy().into_owned();
        assert_exit(run(&["compile", "-d", &absent, "-t", "python"]), 1);
    }

    #[test]
    fn targets_succeeds() {
        assert_exit(run(&["targets"]), 0);
    }

    #[test]
    fn detect_crossover_accepts_adjacent_comparisons() {
        let current = r#"{"operator": ">", "operandA": {"indicator_id": "fast"}, "operandB": {"indicator_id": "slow"}}"#;
        let previous = r#"{"operator": "<=", "operandA": {"indicator_id": "fast"}, "operandB": {"indicator_id": "slow"}}"#;
        assert_exit(
            run(&["detect-crossover", "--current", current, "--previous", previous]),
            0,
        );
    }

    #[test]
    fn detect_crossover_rejects_malformed_json() {
        assert_exit(
            run(&["detect-crossover", "--current", "{", "--previous", "{}"]),
            1,
        );
    }
}
