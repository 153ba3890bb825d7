//! StepFlow CLI Entry Point
//!
//! Loads an action registry and runs one action from it.
//!
//! # Usage
//!
//! ```bash
//! # Run a flow with an input payload
//! stepflow actions.yaml workflow --input '{"hello": "world"}'
//!
//! # Pass query parameters and an overall time budget
//! stepflow actions.yaml report --query page=2 --query sort=desc --timeout 10
//!
//! # Show the execution timeline afterwards
//! stepflow actions.yaml workflow --trace
//! ```

use std::collections::BTreeMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use log::{error, info};
use serde_json::Value;

use stepflow::execution::Engine;
use stepflow::monitoring::ExecutionTimeline;
use stepflow::workflow::parser::load_registry;
use stepflow::config::timeout_from_secs;
use stepflow::{EngineConfig, StepResult, APP_NAME, VERSION};

/// Options for a single `stepflow` invocation.
#[derive(Debug)]
struct Config {
    registry_path: String,
    action: String,
    input: Value,
    query: BTreeMap<String, String>,
    timeout: Option<Duration>,
    trace: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_path: String::new(),
            action: String::new(),
            input: Value::Object(Default::default()),
            query: BTreeMap::new(),
            timeout: None,
            trace: false,
            verbose: false,
        }
    }
}

/// Initializes env_logger; warnings and errors carry a level prefix.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Banner goes to stderr so stdout holds only the result JSON.
fn print_banner() {
    eprintln!();
    eprintln!("{} v{}", APP_NAME, VERSION);
    eprintln!("Declarative Action Execution Engine");
    eprintln!();
}

fn print_usage() {
    println!("Usage: stepflow [OPTIONS] <REGISTRY_FILE> <ACTION>");
    println!();
    println!("Arguments:");
    println!("  <REGISTRY_FILE>     Path to the action registry (YAML or JSON)");
    println!("  <ACTION>            Name of the action to run");
    println!();
    println!("Options:");
    println!("  --input JSON        Input payload (default: {{}})");
    println!("  --query KEY=VALUE   Query parameter, may be repeated");
    println!("  --timeout SECS      Overall time budget for the run");
    println!("  --trace             Print the execution timeline");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Environment:");
    println!("  STEPFLOW_RETRY_BASE_MS, STEPFLOW_RETRY_CAP_MS, STEPFLOW_TIMEOUT_S");
    println!();
    println!("Examples:");
    println!("  stepflow actions.yaml workflow --input '{{\"hello\": \"world\"}}'");
    println!("  stepflow actions.yaml report --query page=2 --trace");
}

/// Returns the value following an option, advancing the cursor.
fn option_value<'a>(args: &'a [String], i: &mut usize, name: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", name))
}

/// Turns `args` (program name first) into a [`Config`].
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--trace" => {
                config.trace = true;
            }
            "--input" => {
                let raw = option_value(args, &mut i, "--input")?;
                config.input = serde_json::from_str(raw)
                    .map_err(|e| format!("Invalid --input JSON: {}", e))?;
            }
            "--query" => {
                let raw = option_value(args, &mut i, "--query")?;
                let (key, value) = raw
                    .split_once('=')
                    .ok_or_else(|| format!("Invalid --query '{}': expected KEY=VALUE", raw))?;
                config.query.insert(key.to_string(), value.to_string());
            }
            "--timeout" => {
                let raw = option_value(args, &mut i, "--timeout")?;
                let secs: f64 = raw
                    .parse()
                    .map_err(|_| format!("Invalid timeout value: {}", raw))?;
                let timeout = timeout_from_secs(secs)
                    .ok_or_else(|| format!("Timeout must be a positive number of seconds within range: {}", raw))?;
                config.timeout = Some(timeout);
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.registry_path = arg.clone(),
                    1 => config.action = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    if positional_index < 2 {
        return Err("Both <REGISTRY_FILE> and <ACTION> are required".to_string());
    }

    Ok(config)
}

/// Main application entry point. Returns the `ok` flag of the result.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    // Load registry
    let registry = load_registry(&config.registry_path).map_err(|e| {
        error!("Failed to load registry: {}", e);
        format!("Could not load registry from '{}': {}", config.registry_path, e)
    })?;
    info!("Registry loaded: {} actions", registry.len());

    // CLI timeout wins over STEPFLOW_TIMEOUT_S
    let mut engine_config = EngineConfig::from_env();
    if let Some(timeout) = config.timeout {
        engine_config = engine_config.with_timeout(timeout);
    }

    let mut engine = Engine::new(registry);
    engine.set_config(engine_config);

    let timeline = Arc::new(ExecutionTimeline::new());
    if config.trace {
        engine.set_event_sink(timeline.clone());
    }

    // Execute
    let result = match engine.run_with_query(&config.action, config.input, config.query) {
        Ok(result) => result,
        Err(e) => {
            error!("{}", e);
            StepResult::from_error(&e)
        }
    };
    println!("{}", serde_json::to_string_pretty(&result)?);

    if config.trace {
        eprintln!("{}", timeline.gantt_chart());
    }

    let status = if result.ok {
        "OK".green().bold()
    } else {
        "FAILED".red().bold()
    };
    eprintln!("{} {} (status {})", status, config.action, result.status);

    Ok(result.ok)
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
