//! A simple CLI tool for auditing the turnout of an Icelect election.
//! It recomputes the verifier of every issued credential from the private
//! verification list and checks that the published verifiers all match.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use clap::{Arg, ArgAction, ArgMatches, Command};

use icelect::audit::{audit, read_verification_list, AuditError, AuditExport, AuditReport};

const PROGRAM_NAME: &str = "verify-icelect";

const ABOUT_TEXT: &str = "Audit the turnout of an Icelect election.

EXIT CODES:
     0: Every published verifier belongs to an issued credential.
   255: Ran successfully, but unknown or duplicated verifiers were found.
 Other: Error.";

const VERIFICATION_LIST: &str = "VERIFICATION_LIST";
const AUDIT_EXPORT: &str = "AUDIT_EXPORT";

const VERIFICATION_LIST_HELP: &str = "The private `.verify` file written by gen-credentials";

const AUDIT_EXPORT_HELP: &str = "The verifier list published by the authority,\n\
as written by `icelect export-verifiers`";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(VERIFICATION_LIST)
                .help(VERIFICATION_LIST_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(AUDIT_EXPORT)
                .help(AUDIT_EXPORT_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
}

fn open(path: &str) -> Result<BufReader<File>, AuditError> {
    File::open(Path::new(path))
        .map(BufReader::new)
        .map_err(|e| AuditError::Io(format!("{path}: {e}")))
}

/// Read both files and audit the export.
fn verify(verification_list: &str, audit_export: &str) -> Result<AuditReport, AuditError> {
    let proofs = read_verification_list(open(verification_list)?)?;
    let export = AuditExport::read_from(open(audit_export)?)?;
    Ok(audit(&proofs, &export))
}

/// Run the audit, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    // Required arguments are guaranteed to be present.
    let verification_list: &String = args.get_one(VERIFICATION_LIST).unwrap();
    let audit_export: &String = args.get_one(AUDIT_EXPORT).unwrap();

    match verify(verification_list, audit_export) {
        Ok(report) => {
            print!("{report}");
            if report.is_verified() {
                println!("Verification succeeded.");
                0
            } else {
                println!("Verification failed.");
                255
            }
        }
        Err(err) => {
            println!("Error: {err}");
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use icelect::model::{
        credential::CredentialBatch,
        receipt::{verifier, ElectionKey},
    };

    use super::*;

    /// Writes a batch of credentials and an export of the verifiers of the
    /// first `voted` of them.
    fn setup(dir: &Path, voted: usize) -> (PathBuf, PathBuf, ElectionKey) {
        let batch = CredentialBatch::generate(5);
        let [_, verify_file, _] = batch.write_files(&dir.join("batch")).unwrap();

        let key = ElectionKey::generate();
        let verifiers = batch.entries[..voted]
            .iter()
            .map(|entry| verifier(&entry.proof_value, &key))
            .collect();
        let export_file = dir.join("export.txt");
        AuditExport::new(key.clone(), verifiers)
            .write_to(File::create(&export_file).unwrap())
            .unwrap();
        (verify_file, export_file, key)
    }

    fn args(verify_file: &Path, export_file: &Path) -> ArgMatches {
        cli()
            .try_get_matches_from([
                PROGRAM_NAME,
                verify_file.to_str().unwrap(),
                export_file.to_str().unwrap(),
            ])
            .unwrap()
    }

    #[test]
    fn honest_turnout() {
        let dir = tempfile::tempdir().unwrap();
        let (verify_file, export_file, _) = setup(dir.path(), 3);

        let report = verify(verify_file.to_str().unwrap(), export_file.to_str().unwrap()).unwrap();
        assert!(report.is_verified());
        assert_eq!(report.matched, 3);
        assert_eq!(report.issued, 5);
        assert_eq!(run(&args(&verify_file, &export_file)), 0);
    }

    #[test]
    fn stuffed_turnout() {
        let dir = tempfile::tempdir().unwrap();
        let (verify_file, export_file, key) = setup(dir.path(), 2);

        let stranger = CredentialBatch::generate(1);
        let mut text = fs::read_to_string(&export_file).unwrap();
        text.push_str(verifier(&stranger.entries[0].proof_value, &key).as_str());
        text.push('\n');
        fs::write(&export_file, text).unwrap();

        let report = verify(verify_file.to_str().unwrap(), export_file.to_str().unwrap()).unwrap();
        assert_eq!(report.unknown.len(), 1);
        assert_eq!(run(&args(&verify_file, &export_file)), 255);
    }

    #[test]
    fn unreadable_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let (verify_file, export_file, _) = setup(dir.path(), 1);
        let missing = dir.path().join("missing.txt");

        assert!(matches!(
            verify(missing.to_str().unwrap(), export_file.to_str().unwrap()),
            Err(AuditError::Io(_))
        ));
        assert_eq!(run(&args(&verify_file, &missing)), 1);

        // The export and the verification list are not interchangeable.
        assert!(matches!(
            verify(export_file.to_str().unwrap(), verify_file.to_str().unwrap()),
            Err(AuditError::MissingKey)
        ));
    }

    #[test]
    fn cli_needs_both_paths() {
        cli().try_get_matches_from([PROGRAM_NAME]).unwrap_err();
        cli().try_get_matches_from([PROGRAM_NAME, "a.verify"]).unwrap_err();
    }
}
