use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shamash::{
    format_result_json, format_result_text, run_with_config, validate_policy, BaselineMode,
    CancelToken, ConsoleFormat, EngineConfig, RunError, Severity, ValidationSeverity,
};

#[derive(Parser)]
#[command(name = "shamash", version, about = "Architecture compliance engine for JVM bytecode")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a compiled project against its policy
    Scan {
        /// Path to the project root
        path: PathBuf,

        /// Path to the policy file (default: shamash.yml under the root)
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Output directory for the report bundle
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Fail (exit 1) on findings at or above this severity
        #[arg(long, value_name = "SEVERITY", default_value = "error")]
        fail_on: String,

        /// Baseline mode override: none, generate, or use
        #[arg(long, value_name = "MODE")]
        baseline: Option<String>,

        /// Skip graph/hotspot/scoring analysis
        #[arg(long)]
        no_analysis: bool,

        /// Evaluate rules sequentially
        #[arg(long)]
        sequential: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the policy without scanning
    Validate {
        /// Path to the project root
        path: PathBuf,

        /// Path to the policy file (default: shamash.yml under the root)
        #[arg(long)]
        policy: Option<PathBuf>,
    },
}

fn parse_fail_on(input: &str) -> Result<Severity, String> {
    Severity::parse(input)
        .ok_or_else(|| format!("unknown severity '{}' (use 'error', 'warning', or 'info')", input))
}

fn parse_baseline(input: &str) -> Result<BaselineMode, String> {
    BaselineMode::parse(input)
        .ok_or_else(|| format!("unknown baseline mode '{}' (use 'none', 'generate', or 'use')", input))
}

/// True when any finding sits at or above the gate severity.
fn gate_exceeded(by_severity: &[usize; 3], gate: Severity) -> bool {
    by_severity
        .iter()
        .enumerate()
        .any(|(rank, &count)| rank as u8 <= gate.rank() && count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fail_on() {
        assert_eq!(parse_fail_on("error").unwrap(), Severity::Error);
        assert_eq!(parse_fail_on("WARNING").unwrap(), Severity::Warning);
        assert!(parse_fail_on("fatal").is_err());
    }

    #[test]
    fn test_parse_baseline() {
        assert_eq!(parse_baseline("generate").unwrap(), BaselineMode::Generate);
        assert!(parse_baseline("maybe").is_err());
    }

    #[test]
    fn test_gate_exceeded() {
        // [errors, warnings, infos]
        assert!(gate_exceeded(&[1, 0, 0], Severity::Error));
        assert!(!gate_exceeded(&[0, 5, 0], Severity::Error));
        assert!(gate_exceeded(&[0, 5, 0], Severity::Warning));
        assert!(gate_exceeded(&[0, 0, 1], Severity::Info));
        assert!(!gate_exceeded(&[0, 0, 0], Severity::Info));
    }
}

fn exit_code_for(error: &RunError) -> i32 {
    match error {
        RunError::Validation(_) | RunError::Config(_) | RunError::Path(_) => 2,
        RunError::Io(_) | RunError::Canceled => 3,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            policy,
            output_dir,
            fail_on,
            baseline,
            no_analysis,
            sequential,
            json,
        } => {
            let root = match path.canonicalize() {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Error: cannot resolve path '{}': {}", path.display(), e);
                    process::exit(2);
                }
            };
            let gate = match parse_fail_on(&fail_on) {
                Ok(g) => g,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(2);
                }
            };
            let baseline_mode = match baseline.as_deref().map(parse_baseline).transpose() {
                Ok(mode) => mode,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(2);
                }
            };

            let mut config = EngineConfig::new(root);
            config.policy_path = policy;
            config.output_dir = output_dir;
            config.baseline_mode = baseline_mode;
            if no_analysis {
                config.analysis = Some(false);
            }
            config.parallel = !sequential;

            match run_with_config(&config, &CancelToken::new()) {
                Ok(result) => {
                    let format = if json { ConsoleFormat::Json } else { ConsoleFormat::Text };
                    match format {
                        ConsoleFormat::Text => print!("{}", format_result_text(&result)),
                        ConsoleFormat::Json => print!("{}", format_result_json(&result)),
                    }
                    if !result.is_success() {
                        process::exit(3);
                    }
                    if gate_exceeded(&result.summary.findings_by_severity, gate) {
                        process::exit(1);
                    }
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(exit_code_for(&e));
                }
            }
        }
        Commands::Validate { path, policy } => {
            let root = match path.canonicalize() {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Error: cannot resolve path '{}': {}", path.display(), e);
                    process::exit(2);
                }
            };
            let mut config = EngineConfig::new(root);
            config.policy_path = policy;
            match validate_policy(&config) {
                Ok(diagnostics) => {
                    let mut blocking = 0;
                    for diagnostic in &diagnostics {
                        let tag = match diagnostic.severity {
                            ValidationSeverity::Error => {
                                blocking += 1;
                                "ERROR"
                            }
                            ValidationSeverity::Warn => "WARN",
                        };
                        println!("{} {}: {}", tag, diagnostic.path, diagnostic.message);
                    }
                    if blocking > 0 {
                        eprintln!("Policy invalid: {} error(s)", blocking);
                        process::exit(2);
                    }
                    println!("Policy OK ({} warning(s))", diagnostics.len());
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(exit_code_for(&e));
                }
            }
        }
    }
}
