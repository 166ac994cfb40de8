//! Administration tool for Icelect elections.
//!
//! State is kept in the JSON data file named by the configuration and
//! written back after every command that changes it.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info};
use thiserror::Error;

use icelect::{
    admin,
    model::{
        ballot::Submission,
        election::{ElectionPhase, ElectionSpec},
        store::MemoryStore,
    },
    recorder::{VoteError, VoteRecorder},
    Config,
};

const PROGRAM_NAME: &str = "icelect";

const ABOUT_TEXT: &str = "Manage Icelect elections.

Election definitions are read from <election_dir>/IDENT.toml.

EXIT CODES:
     0: Success.
     2: The vote was rejected.
 Other: Error.";

const IDENT: &str = "IDENT";
const FILE: &str = "FILE";
const PHASE: &str = "PHASE";
const JSON: &str = "json";
const PREVIEW: &str = "preview";
const OUTPUT: &str = "output";
const NONCE: &str = "nonce";
const RANKS: &str = "RANKS";

/// Errors that this program may produce.
#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Icelect(#[from] icelect::Error),
    #[error(transparent)]
    Vote(#[from] VoteError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Icelect(err.into())
    }
}

fn ident_arg() -> Arg {
    Arg::new(IDENT)
        .help("Alphanumeric identifier of the election")
        .action(ArgAction::Set)
        .required(true)
}

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .subcommand(Command::new("list").about("List all elections"))
        .subcommand(
            Command::new("create")
                .about("Create a new election from its definition file")
                .arg(ident_arg()),
        )
        .subcommand(
            Command::new("update")
                .about("Reload the definition of an election that has not started")
                .arg(ident_arg()),
        )
        .subcommand(
            Command::new("register")
                .about("Register voters from a list of eligibility hashes")
                .arg(ident_arg())
                .arg(
                    Arg::new(FILE)
                        .help("Registration list [default: <election_dir>/IDENT.eligible]")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("advance")
                .about("Move an election to its next phase")
                .arg(ident_arg())
                .arg(
                    Arg::new(PHASE)
                        .help("One of voting, counting, results")
                        .required(true)
                        .value_parser(ElectionPhase::from_str),
                ),
        )
        .subcommand(
            Command::new("results")
                .about("Show the published results")
                .arg(ident_arg())
                .arg(json_flag())
                .arg(
                    Arg::new(PREVIEW)
                        .long(PREVIEW)
                        .help("Tally the current ballots without publishing")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("ballots")
                .about("List all ballots of a finished election")
                .arg(ident_arg())
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("export-verifiers")
                .about("Write the verifier list for the turnout audit")
                .arg(ident_arg())
                .arg(
                    Arg::new(OUTPUT)
                        .short('o')
                        .long(OUTPUT)
                        .help("Write to this file instead of stdout")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("vote")
                .about("Record a vote; the credential is read from stdin")
                .arg(ident_arg())
                .arg(
                    Arg::new(NONCE)
                        .short('n')
                        .long(NONCE)
                        .help("Nonce shown next to the ballot, at most 16 characters")
                        .required(true),
                )
                .arg(
                    Arg::new(RANKS)
                        .help("Rank of each option in definition order, lower is better")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(u32)),
                ),
        )
}

fn json_flag() -> Arg {
    Arg::new(JSON)
        .long(JSON)
        .help("Print JSON instead of text")
        .action(ArgAction::SetTrue)
}

/// Run one command and return the exit code.
fn run(args: &ArgMatches, config: &Config, stdin: impl BufRead, mut out: impl Write) -> Result<u8, Error> {
    let store = MemoryStore::load(config.data_file()).map_err(icelect::Error::from)?;

    // Required arguments are guaranteed to be present.
    let (command, sub) = args.subcommand().expect("subcommand is required");
    let ident = move || sub.get_one::<String>(IDENT).expect("IDENT is required").as_str();

    let mut changed = true;
    match command {
        "create" => {
            let spec = load_spec(config, ident())?;
            let election = admin::create_election(&store, ident(), spec)?;
            writeln!(out, "Created election {} ({})", election.ident, election.title())?;
        }
        "update" => {
            let spec = load_spec(config, ident())?;
            admin::update_election(&store, ident(), spec)?;
            writeln!(out, "Updated election {}", ident())?;
        }
        "register" => {
            let path = sub
                .get_one::<PathBuf>(FILE)
                .cloned()
                .unwrap_or_else(|| config.eligibility_file(ident()));
            let input = BufReader::new(File::open(&path)?);
            let report = admin::register_voters(&store, ident(), input)?;
            writeln!(out, "{report}")?;
        }
        "advance" => {
            let phase = *sub.get_one::<ElectionPhase>(PHASE).expect("PHASE is required");
            admin::advance_phase(&store, ident(), phase)?;
            writeln!(out, "Election {} is now in phase {phase}", ident())?;
        }
        "vote" => {
            let mut credential = String::new();
            stdin.take(256).read_line(&mut credential)?;
            let nonce = sub.get_one::<String>(NONCE).expect("nonce is required");
            let ranks = sub.get_many::<u32>(RANKS).expect("RANKS is required").copied().collect();

            let submission = Submission::new(credential, nonce.as_str(), ranks);
            match VoteRecorder::new(&store).record(ident(), &submission) {
                Ok(receipt) => writeln!(out, "Vote recorded. Receipt: {receipt}, nonce: {nonce}")?,
                Err(err) if err.is_rejection() => {
                    writeln!(out, "Vote rejected: {err}")?;
                    return Ok(2);
                }
                Err(err) => return Err(err.into()),
            }
        }
        _ => {
            changed = false;
            show(command, sub, &store, &mut out)?;
        }
    }

    if changed {
        store.save(config.data_file()).map_err(icelect::Error::from)?;
    }
    Ok(0)
}

/// Read-only commands.
fn show(command: &str, sub: &ArgMatches, store: &MemoryStore, mut out: impl Write) -> Result<(), Error> {
    let ident = move || sub.get_one::<String>(IDENT).expect("IDENT is required").as_str();
    let json = || sub.get_flag(JSON);

    match command {
        "list" => {
            for election in admin::list_elections(store)? {
                writeln!(out, "{}\t{}\t{}", election.ident, election.phase, election.title())?;
            }
        }
        "results" => {
            let snapshot = if sub.get_flag(PREVIEW) {
                admin::compute_results(store, ident())?
            } else {
                admin::results(store, ident())?
            };
            if json() {
                serde_json::to_writer_pretty(&mut out, &snapshot).map_err(icelect::Error::from)?;
                writeln!(out)?;
            } else {
                write!(out, "{snapshot}")?;
            }
        }
        "ballots" => {
            let ballots = admin::ballots(store, ident())?;
            if json() {
                serde_json::to_writer_pretty(&mut out, &ballots).map_err(icelect::Error::from)?;
                writeln!(out)?;
            } else {
                for ballot in ballots {
                    let ranks: Vec<_> = ballot.ranks.iter().map(u32::to_string).collect();
                    writeln!(out, "{}\t{}\t{}", ballot.receipt, ballot.nonce, ranks.join(" "))?;
                }
            }
        }
        "export-verifiers" => {
            let export = admin::export_verifiers(store, ident())?;
            match sub.get_one::<PathBuf>(OUTPUT) {
                Some(path) => {
                    export.write_to(BufWriter::new(File::create(path)?))?;
                    info!("Wrote {} verifiers to {}", export.verifiers.len(), path.display());
                }
                None => export.write_to(&mut out)?,
            }
        }
        _ => unreachable!("unknown subcommand {command}"),
    }
    Ok(())
}

fn load_spec(config: &Config, ident: &str) -> icelect::Result<ElectionSpec> {
    Ok(ElectionSpec::from_file(&config.election_file(ident))?)
}

fn main() {
    let args = cli().get_matches();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            std::process::exit(1)
        }
    };
    if let Err(err) = icelect::logging::init(config.log_config()) {
        eprintln!("{err}");
        std::process::exit(1)
    }

    let stdin = io::stdin();
    let exit_code = match run(&args, &config, stdin.lock(), io::stdout().lock()) {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            eprintln!("Error: {err}");
            1
        }
    };
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use figment::Figment;

    use icelect::model::credential::CredentialBatch;

    use super::*;

    struct Setup {
        dir: tempfile::TempDir,
        config: Config,
    }

    impl Setup {
        fn new() -> Self {
            log4rs_test_utils::test_logging::init_logging_once_for(["icelect"], None, None);
            let dir = tempfile::tempdir().unwrap();
            let config: Config = Figment::from(figment::providers::Serialized::defaults(Config::default()))
                .merge(("data_file", dir.path().join("state.json")))
                .merge(("election_dir", dir.path()))
                .extract()
                .unwrap();
            fs::write(
                dir.path().join("board.toml"),
                "title = \"Board\"\noptions = [\"Yes\", \"No\", \"Abstain\"]\n",
            )
            .unwrap();
            Self { dir, config }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn run(&self, command_line: &[&str], stdin: &str) -> (u8, String) {
            let args = cli()
                .try_get_matches_from([PROGRAM_NAME].iter().chain(command_line))
                .unwrap();
            let mut out = Vec::new();
            let code = match run(&args, &self.config, stdin.as_bytes(), &mut out) {
                Ok(code) => code,
                Err(err) => {
                    writeln!(out, "{err}").unwrap();
                    1
                }
            };
            (code, String::from_utf8(out).unwrap())
        }
    }

    #[test]
    fn election_from_start_to_finish() {
        let setup = Setup::new();
        let batch = CredentialBatch::generate(3);
        let [_, _, eligible] = batch.write_files(&setup.path().join("board")).unwrap();
        assert_eq!(eligible, setup.config.eligibility_file("board"));

        assert_eq!(setup.run(&["create", "board"], "").0, 0);
        let (code, out) = setup.run(&["register", "board"], "");
        assert_eq!(code, 0);
        assert_eq!(out, "Processed 3 hashes. Registered voters: 0 before, 3 after.\n");
        assert_eq!(setup.run(&["advance", "board", "voting"], "").0, 0);

        for entry in &batch.entries {
            let credential = format!("{}\n", entry.credential.expose());
            let (code, out) = setup.run(&["vote", "board", "-n", "mine", "1", "2", "3"], &credential);
            assert_eq!(code, 0, "{out}");
            assert!(out.starts_with("Vote recorded. Receipt: "));
        }
        let (code, out) = setup.run(&["vote", "board", "-n", "x", "1", "2", "3"], "ZZZZZZZZ\n");
        assert_eq!(code, 2);
        assert!(out.starts_with("Vote rejected"));

        assert_eq!(setup.run(&["advance", "board", "counting"], "").0, 0);
        assert_eq!(setup.run(&["advance", "board", "results"], "").0, 0);

        let (code, out) = setup.run(&["results", "board"], "");
        assert_eq!(code, 0);
        assert!(out.contains("Condorcet winner: Yes"));
        let (code, out) = setup.run(&["results", "board", "--json"], "");
        assert_eq!(code, 0);
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["tally"]["ballots"], 3);

        let (code, out) = setup.run(&["ballots", "board"], "");
        assert_eq!(code, 0);
        assert_eq!(out.lines().count(), 3);
        assert!(out.lines().all(|line| line.ends_with("\tmine\t1 2 3")));

        let (code, out) = setup.run(&["export-verifiers", "board"], "");
        assert_eq!(code, 0);
        assert!(out.starts_with("# verify-key "));
        assert_eq!(out.lines().count(), 4);

        let (code, out) = setup.run(&["list"], "");
        assert_eq!(code, 0);
        assert_eq!(out, "board\tresults\tBoard\n");
    }

    #[test]
    fn errors_exit_with_one() {
        let setup = Setup::new();
        assert_eq!(setup.run(&["create", "missing"], "").0, 1);
        assert_eq!(setup.run(&["advance", "board", "voting"], "").0, 1);
        assert_eq!(setup.run(&["create", "board"], "").0, 0);
        assert_eq!(setup.run(&["create", "board"], "").0, 1);
        assert_eq!(setup.run(&["advance", "board", "results"], "").0, 1);
        assert_eq!(setup.run(&["register", "board"], "").0, 1);
    }

    #[test]
    fn bad_cli_usage() {
        cli().try_get_matches_from([PROGRAM_NAME]).unwrap_err();
        cli().try_get_matches_from([PROGRAM_NAME, "advance", "board", "sideways"]).unwrap_err();
        cli().try_get_matches_from([PROGRAM_NAME, "vote", "board", "1", "2"]).unwrap_err();
        cli().try_get_matches_from([PROGRAM_NAME, "vote", "board", "-n", "x", "one"]).unwrap_err();
    }
}
