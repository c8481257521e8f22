//! Dual-modal (face + voice) identity matching.
//!
//! # Flow
//!
//! 1. Each captured vector is looked up in its modality's index (k = 1).
//! 2. If both lookups return a candidate, each modality's [`Verifier`]
//!    compares the capture against the candidate's stored vector.
//! 3. The decision table authorizes, rejects, or falls through to
//!    enrollment:
//!
//! ```text
//! same candidate | face ok | voice ok | outcome
//! ---------------+---------+----------+--------------------------
//! yes            | yes     | yes      | Authorized(id)
//! any            | exactly one        | Rejected(ambiguous)
//! no             | yes     | yes      | Rejected(disagreement)
//! any            | no      | no       | enroll
//! ```
//!
//! 4. Enrollment allocates an ID and inserts it into both indexes and the
//!    identity store; if any step fails the others are rolled back.

mod engine;
mod error;
mod extract;
mod identity;
mod identity_redb;
mod outcome;
mod verify;

pub use engine::{EngineContext, MatchEngine};
pub use error::EngineError;
pub use extract::FeatureExtractor;
pub use identity::{IdentityRecord, IdentityStore, IdentityUpdate, MemoryIdentityStore};
pub use identity_redb::RedbIdentityStore;
pub use outcome::{FailureReason, MatchOutcome, RejectReason};
pub use verify::{CosineVerifier, Threshold, Verifier};

pub use biogate_vecstore::IdentityId;
