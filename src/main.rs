//! tiergate CLI entry point.
//!
//! ## Subcommands
//!
//! - `tiergate-cli simulate` - Run synthetic load through the admission core
//! - `tiergate-cli config show|defaults|validate` - Inspect configuration
//! - `tiergate-cli version` / `help`

use std::process::ExitCode;

use tiergate::cli::{config_cmd, run_simulate, SimulateOptions, EXIT_CONFIG_ERROR};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "simulate" | "sim" => match SimulateOptions::parse(&args[2..]) {
            Ok(options) => exit(run_simulate(options).await),
            Err(e) => {
                eprintln!("{e}");
                print_command_help("simulate");
                exit(EXIT_CONFIG_ERROR)
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => exit(config_cmd::run_show()),
                "defaults" => exit(config_cmd::run_defaults()),
                "validate" => exit(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("tiergate {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "tiergate - tiered admission and priority scheduling v{}

USAGE:
    tiergate-cli [COMMAND] [OPTIONS]

COMMANDS:
    simulate     Run synthetic mixed-tier load through the simulated backend
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    tiergate-cli simulate --requests 500
    tiergate-cli simulate --failure-rate 0.2 --json
    tiergate-cli config validate

ENVIRONMENT:
    TIERGATE_CONFIG      Path to a TOML configuration file
    TIERGATE_*           Per-setting overrides (see `tiergate-cli config show`)
    TIERGATE_LOG_LEVEL   Tracing filter (debug, info, warn, error)

EXIT CODES:
    0  Success
    1  Failure / validation warnings
    2  Configuration or argument error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "simulate" | "sim" => {
            eprintln!(
                "tiergate-cli simulate - Run synthetic load

USAGE:
    tiergate-cli simulate [OPTIONS]

OPTIONS:
    -n, --requests N      Number of requests to submit (default: 100)
    --failure-rate P      Simulated backend failure probability, 0..=1
    --json                Print detailed stats as JSON

DESCRIPTION:
    Submits N requests with a 20/30/50 enterprise/premium/free mix
    concurrently, waits for them to drain, and prints per-tier results.
"
            );
        }
        "config" => {
            eprintln!(
                "tiergate-cli config - Inspect configuration

USAGE:
    tiergate-cli config [show|defaults|validate]

SUBCOMMANDS:
    show       Print effective values after file and environment overrides
    defaults   Print built-in defaults
    validate   Check for policy misconfigurations (exit 1 on warnings)
"
            );
        }
        other => {
            eprintln!("No help available for '{}'", other);
            print_usage();
        }
    }
}
