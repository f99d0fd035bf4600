//! Command-line interface for sfm
//! This binary converts SFM field-data files into XML using a mapping file,
//! and can validate mapping files on their own.
//!
//! Usage:
//!   sfm convert <input> --map <mapping> [--output <path>]   - Convert a file
//!   sfm check-map <mapping>                                 - Validate a mapping

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

use sfm_parser::sfm::diagnostics::DiagnosticsLog;
use sfm_parser::sfm::mapping::{load_mapping, validate};

fn main() {
    let matches = Command::new("sfm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convert Standard Format Marker field data to XML")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v info, -vv debug)"),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert an SFM file to XML using a mapping")
                .arg(
                    Arg::new("input")
                        .help("Path to the SFM input file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("map")
                        .long("map")
                        .short('m')
                        .help("Path to the mapping file (YAML or JSON)")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Output path (default: the input path with an .xml extension)"),
                ),
        )
        .subcommand(
            Command::new("check-map")
                .about("Validate a mapping file and report its problems")
                .arg(
                    Arg::new("map")
                        .help("Path to the mapping file")
                        .required(true)
                        .index(1),
                ),
        )
        .get_matches();

    init_tracing(matches.get_count("verbose"));

    match matches.subcommand() {
        Some(("convert", sub)) => handle_convert(sub),
        Some(("check-map", sub)) => handle_check_map(sub),
        _ => unreachable!("subcommand is required"),
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Handle the convert command
fn handle_convert(matches: &clap::ArgMatches) {
    let input = PathBuf::from(matches.get_one::<String>("input").expect("input is required"));
    let map = PathBuf::from(matches.get_one::<String>("map").expect("map is required"));
    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("xml"));

    match sfm_parser::convert_file(&input, &map, &output) {
        Ok(summary) => {
            eprintln!(
                "Wrote {} ({} errors, {} warnings, {} out-of-order cautions)",
                output.display(),
                summary.errors,
                summary.warnings,
                summary.cautions
            );
            if !summary.is_clean() {
                eprintln!("See the <report> block in the output for details.");
            }
        }
        Err(e) => {
            eprintln!("Conversion failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle the check-map command
fn handle_check_map(matches: &clap::ArgMatches) {
    let map = PathBuf::from(matches.get_one::<String>("map").expect("map is required"));
    let doc = load_mapping(&map).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    let mut log = DiagnosticsLog::new();
    let result = validate(doc, &mut log);
    for record in log.errors().iter().chain(log.warnings().iter()) {
        println!("{}", record);
    }
    match result {
        Ok(resolved) => {
            println!(
                "Mapping OK: {} levels (root '{}'), {} fields, {} inline markers",
                resolved.levels.len(),
                resolved.root_level,
                resolved.fields.len(),
                resolved.inlines.len()
            );
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
