use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

use crate::error::{Error, Result};

const FALLBACK_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}";

/// A unique identifier for a particular vote submission, so that the log
/// lines of one submission can be correlated without logging anything
/// about the voter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubmissionId(pub usize);

impl Display for SubmissionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SubmissionId {
    /// Atomically get the next ID. This wraps around back to zero if you somehow exceed a usize.
    pub fn next() -> SubmissionId {
        static SUBMISSION_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        SubmissionId(SUBMISSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Set up logging for the command-line tools.
///
/// Uses the log4rs YAML file at `path` if it exists, otherwise logs
/// `info` and above to stderr.
pub fn init(path: &Path) -> Result<()> {
    if path.exists() {
        return log4rs::init_file(path, Default::default())
            .map_err(|e| Error::Logging(e.to_string()));
    }

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(FALLBACK_PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(LevelFilter::Info))
        .map_err(|e| Error::Logging(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| Error::Logging(e.to_string()))?;
    Ok(())
}
