//! Offline generator for voter credentials.
//!
//! Writes three files that correspond line by line: the credentials to hand
//! out, the private verification list for the turnout audit, and the
//! eligibility hashes to register with the election.

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info};

use icelect::{model::credential::CredentialBatch, Config};

const PROGRAM_NAME: &str = "gen-credentials";

const ABOUT_TEXT: &str = "Generate Icelect voter credentials.

Writes OUTPUT.cred (credentials, one per voter), OUTPUT.verify (private
verification list) and OUTPUT.eligible (registration list for `icelect register`).

EXIT CODES:
     0: Success.
 Other: Error.";

const COUNT: &str = "count";
const OUTPUT: &str = "output";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(COUNT)
                .short('c')
                .long(COUNT)
                .help("Number of credentials to generate")
                .action(ArgAction::Set)
                .required(true)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new(OUTPUT)
                .short('o')
                .long(OUTPUT)
                .help("Base path of the output files")
                .action(ArgAction::Set)
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
}

/// Generate the batch, write it out, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    // Required arguments are guaranteed to be present.
    let count: usize = *args.get_one(COUNT).unwrap();
    let base: &PathBuf = args.get_one(OUTPUT).unwrap();

    let batch = CredentialBatch::generate(count);
    match batch.write_files(base) {
        Ok(paths) => {
            info!("Generated {count} credentials at {}", base.display());
            for path in paths {
                println!("{}", path.display());
            }
            0
        }
        Err(err) => {
            error!("Failed to write credentials to {}: {err}", base.display());
            println!("IO error: {err}");
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();

    // Logging is best effort here; the tool works without it.
    match Config::load() {
        Ok(config) => {
            if let Err(err) = icelect::logging::init(config.log_config()) {
                eprintln!("{err}");
            }
        }
        Err(err) => eprintln!("Invalid configuration: {err}"),
    }

    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
