//! Value types shared by every engine component.

mod phase;
mod snapshot;

pub use phase::{Cadence, ConnectionPhase, UnknownPhase};
pub use snapshot::{Account, CandidateSnapshot, CandidateSource, StatusSnapshot};
