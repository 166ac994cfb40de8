use std::io::Write;
use std::ops::{AddAssign, Div};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use rand::seq::SliceRandom;
use rand::Rng;
use tempfile::NamedTempFile;

use icelect::{
    admin,
    audit::audit,
    model::{
        ballot::Submission,
        credential::{CredentialBatch, ProofValue},
        election::{ElectionPhase, ElectionSpec},
        store::MemoryStore,
    },
    recorder::VoteRecorder,
    tally::TallyResult,
};

const ELECTION: &str = "bench";

#[rustfmt::skip]
const OPTIONS: &[&str] = &[
    "Alice",
    "Bob",
    "Carol",
    "Dave",
    "Eve",
    "Fred",
    "Grace",
    "Henry",
    "Irene",
    "Joe",
];

#[derive(Parser)]
struct Args {
    /// How many threads to use. Defaults to the number of logical CPUs.
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// Voters per thread.
    #[arg(long, default_value_t = 1000)]
    voters: usize,

    /// Number of options on the ballot, at most 10.
    #[arg(long, default_value_t = 5)]
    options: usize,

    /// How voters rank the options.
    #[arg(long, value_enum, default_value_t)]
    ballot_mode: BallotMode,

    /// Probability that a voter changes their vote once.
    #[arg(long, default_value_t = 0.05)]
    revote: f64,

    /// Also time saving and loading the store.
    #[arg(long)]
    persist: bool,

    /// Audit the turnout after voting.
    #[arg(long)]
    verify: bool,
}

/// How voters rank the options.
#[derive(Debug, Copy, Clone, ValueEnum)]
enum BallotMode {
    /// A random strict order.
    Strict,
    /// Random ranks with ties and blanks.
    Random,
    /// Everyone agrees, up to small noise.
    Consensus,
}

impl BallotMode {
    fn ranks(&self, options: usize, rng: &mut impl Rng) -> Vec<u32> {
        match self {
            Self::Strict => {
                let mut ranks: Vec<u32> = (1..=options as u32).collect();
                ranks.shuffle(rng);
                ranks
            }
            Self::Random => (0..options).map(|_| rng.gen_range(0..=options as u32)).collect(),
            Self::Consensus => {
                let mut ranks: Vec<u32> = (1..=options as u32).collect();
                let i = rng.gen_range(0..options - 1);
                if rng.gen_bool(0.3) {
                    ranks.swap(i, i + 1);
                }
                ranks
            }
        }
    }
}

impl Default for BallotMode {
    fn default() -> Self {
        Self::Strict
    }
}

/// Durations of each part of the voting process.
#[derive(Debug, Default)]
struct VoteTimings {
    first: Duration,
    revote: Duration,
    revotes: u32,
}

impl AddAssign for VoteTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.first += rhs.first;
        self.revote += rhs.revote;
        self.revotes += rhs.revotes;
    }
}

impl Div<u32> for VoteTimings {
    type Output = Self;

    fn div(self, rhs: u32) -> Self {
        Self {
            first: self.first / rhs,
            revote: self.revote / self.revotes.max(1),
            revotes: self.revotes,
        }
    }
}

/// Create the election, register the batch and open voting.
fn setup_election(store: &MemoryStore, options: usize, batch: &CredentialBatch) -> anyhow::Result<()> {
    if !(2..=OPTIONS.len()).contains(&options) {
        return Err(anyhow!("--options must be between 2 and {}", OPTIONS.len()));
    }
    let spec = ElectionSpec {
        title: "Benchmark".to_string(),
        options: OPTIONS[..options].iter().map(|o| o.to_string()).collect(),
    };
    admin::create_election(store, ELECTION, spec)?;

    let mut registration = Vec::new();
    for entry in &batch.entries {
        writeln!(registration, "{}", entry.eligibility_hash)?;
    }
    let start = Instant::now();
    admin::register_voters(store, ELECTION, registration.as_slice())?;
    println!("register: {} voters in {:?}", batch.len(), start.elapsed());

    admin::advance_phase(store, ELECTION, ElectionPhase::Voting)?;
    Ok(())
}

/// Cast one voter's vote, and maybe change it.
fn cast_vote(store: &MemoryStore, credential: &str, args: &Args) -> anyhow::Result<VoteTimings> {
    let mut rng = rand::thread_rng();
    let recorder = VoteRecorder::new(store);
    let nonce: u32 = rng.gen();

    let pre_cast = Instant::now();
    let ranks = args.ballot_mode.ranks(args.options, &mut rng);
    recorder.record(ELECTION, &Submission::new(credential, nonce.to_string(), ranks))?;
    let first = pre_cast.elapsed();

    let mut timings = VoteTimings {
        first,
        ..Default::default()
    };
    if rng.gen_bool(args.revote) {
        let pre_revote = Instant::now();
        let ranks = args.ballot_mode.ranks(args.options, &mut rng);
        recorder.record(ELECTION, &Submission::new(credential, nonce.to_string(), ranks))?;
        timings.revote = pre_revote.elapsed();
        timings.revotes = 1;
    }
    Ok(timings)
}

/// Run the voting benchmark.
fn benchmark(store: &MemoryStore, batch: &CredentialBatch, args: &Args) -> anyhow::Result<()> {
    let start = Instant::now();
    let timings = thread::scope(|s| {
        let threads: Vec<_> = batch
            .entries
            .chunks(args.voters)
            .map(|chunk| {
                s.spawn(move || {
                    let mut timings = VoteTimings::default();
                    for entry in chunk {
                        timings += cast_vote(store, entry.credential.expose(), args)?;
                    }
                    Ok::<_, anyhow::Error>(timings / chunk.len() as u32)
                })
            })
            .collect();

        let mut timings = VoteTimings::default();
        for t in threads {
            timings += t.join().map_err(|_| anyhow!("thread panicked"))??;
        }
        Ok::<_, anyhow::Error>(timings)
    })?;
    let total_duration = start.elapsed();

    let total_votes = batch.len() as u32 + timings.revotes;
    println!("vote: {:?}", timings.first / args.threads as u32);
    println!("revote: {:?} ({} revotes)", timings.revote / args.threads as u32, timings.revotes);
    println!(
        "actual duration: {} votes in {:?} ({:.2}/s)",
        total_votes,
        total_duration,
        total_votes as f64 / total_duration.as_secs_f64()
    );
    Ok(())
}

/// Close the election and time the tally.
fn tally(store: &MemoryStore) -> anyhow::Result<TallyResult> {
    admin::advance_phase(store, ELECTION, ElectionPhase::Counting)?;
    let start = Instant::now();
    admin::advance_phase(store, ELECTION, ElectionPhase::Results)?;
    let duration = start.elapsed();

    let snapshot = admin::results(store, ELECTION)?;
    println!("\ntally: {} ballots in {:?}", snapshot.tally.ballots, duration);
    print!("{snapshot}");
    Ok(snapshot.tally)
}

fn persist(store: &MemoryStore) -> anyhow::Result<()> {
    let file = NamedTempFile::new()?;
    let start = Instant::now();
    store.save(file.path())?;
    let saved = start.elapsed();
    let start = Instant::now();
    MemoryStore::load(file.path())?;
    println!("save: {:?}, load: {:?}", saved, start.elapsed());
    Ok(())
}

fn verify(store: &MemoryStore, batch: &CredentialBatch) -> anyhow::Result<()> {
    let proofs: Vec<ProofValue> = batch.entries.iter().map(|e| e.proof_value.clone()).collect();
    let export = admin::export_verifiers(store, ELECTION)?;
    let start = Instant::now();
    let report = audit(&proofs, &export);
    println!("\naudit: {:?}", start.elapsed());
    print!("{report}");
    report
        .is_verified()
        .then_some(())
        .ok_or_else(|| anyhow!("turnout audit failed"))
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.threads == 0 || args.voters == 0 {
        return Err(anyhow!("--threads and --voters must be positive"));
    }

    let batch = CredentialBatch::generate(args.threads * args.voters);
    let store = MemoryStore::new();
    setup_election(&store, args.options, &batch)?;

    benchmark(&store, &batch, &args)?;
    tally(&store)?;
    if args.persist {
        persist(&store)?;
    }
    if args.verify {
        verify(&store, &batch)?;
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("FATAL: {}", e);
        process::exit(1);
    }
}
