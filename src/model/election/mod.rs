use serde::{Deserialize, Serialize};

pub use spec::{ConfigError, ElectionSpec, MIN_OPTIONS};
pub use state::{ElectionPhase, TransitionError, UnknownPhase};

use super::receipt::ElectionKey;

mod spec;
mod state;

/// An election as held by the store.
///
/// The two keys are generated once at creation and never change. The
/// election key must stay private; the verify key is published with the
/// verifier audit export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// Short identifier, also the stem of the definition file.
    pub ident: String,
    pub phase: ElectionPhase,
    pub spec: ElectionSpec,
    pub election_key: ElectionKey,
    pub verify_key: ElectionKey,
}

impl Election {
    /// A fresh election in [`ElectionPhase::Init`] with newly generated keys.
    pub fn new(ident: impl Into<String>, spec: ElectionSpec) -> Self {
        Self {
            ident: ident.into(),
            phase: ElectionPhase::Init,
            spec,
            election_key: ElectionKey::generate(),
            verify_key: ElectionKey::generate(),
        }
    }

    pub fn num_options(&self) -> usize {
        self.spec.num_options()
    }

    pub fn title(&self) -> &str {
        &self.spec.title
    }
}
