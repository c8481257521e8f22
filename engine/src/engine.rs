use std::path::Path;

use biogate_vecstore::{Forest, IdentityId, IndexManager, VecError};
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::extract::FeatureExtractor;
use crate::identity::{IdentityRecord, IdentityStore};
use crate::outcome::{FailureReason, MatchOutcome, RejectReason};
use crate::verify::Verifier;

/// EngineContext owns everything a [`MatchEngine`] mutates: one index per
/// modality and the identity store that allocates IDs.
///
/// Both indexes are keyed by the same identity IDs.
pub struct EngineContext {
    pub face: IndexManager,
    pub voice: IndexManager,
    pub identities: Box<dyn IdentityStore>,
}

/// What the two nearest-neighbor lookups produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidates {
    None,
    Single,
    Dual {
        face: IdentityId,
        voice: IdentityId,
    },
}

/// Result of the verification decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Authorize,
    Enroll,
    Reject(RejectReason),
}

/// Decision table for two candidates.
///
/// A single verified modality never authorizes: exactly one verification
/// rejects regardless of whether the candidates agree.
fn decide(same_candidate: bool, face_verified: bool, voice_verified: bool) -> Decision {
    match (same_candidate, face_verified, voice_verified) {
        (true, true, true) => Decision::Authorize,
        (false, true, true) => Decision::Reject(RejectReason::ModalityDisagreement),
        (_, true, false) | (_, false, true) => Decision::Reject(RejectReason::VerificationAmbiguous),
        (_, false, false) => Decision::Enroll,
    }
}

/// MatchEngine combines a face lookup and a voice lookup into a single
/// authorize / enroll / reject decision.
///
/// Safe to share across threads. Verification and extraction run on vectors
/// copied out of a published snapshot and never hold an index lock.
pub struct MatchEngine {
    ctx: EngineContext,
    face_verifier: Box<dyn Verifier>,
    voice_verifier: Box<dyn Verifier>,
    face_extractor: Option<Box<dyn FeatureExtractor>>,
    voice_extractor: Option<Box<dyn FeatureExtractor>>,
}

impl MatchEngine {
    pub fn new(
        ctx: EngineContext,
        face_verifier: Box<dyn Verifier>,
        voice_verifier: Box<dyn Verifier>,
    ) -> Self {
        Self {
            ctx,
            face_verifier,
            voice_verifier,
            face_extractor: None,
            voice_extractor: None,
        }
    }

    /// Configure extractors used by [`MatchEngine::authenticate_media`].
    pub fn with_extractors(
        mut self,
        face: Box<dyn FeatureExtractor>,
        voice: Box<dyn FeatureExtractor>,
    ) -> Self {
        self.face_extractor = Some(face);
        self.voice_extractor = Some(voice);
        self
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Extract both vectors from media files, then run
    /// [`MatchEngine::authenticate_or_enroll`].
    pub fn authenticate_media(&self, face_media: &Path, voice_media: &Path) -> MatchOutcome {
        let (Some(face_x), Some(voice_x)) = (&self.face_extractor, &self.voice_extractor) else {
            warn!("media authentication requested without extractors");
            return MatchOutcome::Failed(FailureReason::ExtractorUnavailable);
        };
        let face = face_x.extract(face_media);
        let voice = voice_x.extract(voice_media);
        self.authenticate_or_enroll(face.as_deref(), voice.as_deref())
    }

    /// Match the captured vectors against both indexes and authorize,
    /// enroll, or reject.
    ///
    /// A missing vector rejects immediately without touching any index.
    pub fn authenticate_or_enroll(
        &self,
        face_vector: Option<&[f32]>,
        voice_vector: Option<&[f32]>,
    ) -> MatchOutcome {
        let (Some(face), Some(voice)) = (face_vector, voice_vector) else {
            info!("rejected: feature extraction failed");
            return MatchOutcome::Rejected(RejectReason::ExtractionFailed);
        };

        let outcome = self.run(face, voice);
        info!("match outcome: {outcome}");
        outcome
    }

    fn run(&self, face: &[f32], voice: &[f32]) -> MatchOutcome {
        // Pin one snapshot per modality so lookup and vector retrieval see
        // the same contents even if an enrollment publishes meanwhile.
        let face_snap = self.ctx.face.snapshot();
        let voice_snap = self.ctx.voice.snapshot();

        let candidates = match lookup(&face_snap, &voice_snap, face, voice) {
            Ok(c) => c,
            Err(e) => {
                warn!("query failed: {e}");
                return MatchOutcome::Failed(FailureReason::DimensionMismatch);
            }
        };
        debug!("candidates: {candidates:?}");

        match candidates {
            Candidates::None | Candidates::Single => self.enroll(face, voice),
            Candidates::Dual {
                face: face_id,
                voice: voice_id,
            } => {
                let stored_face = face_snap.vector_of(face_id).map(<[f32]>::to_vec);
                let stored_voice = voice_snap.vector_of(voice_id).map(<[f32]>::to_vec);
                drop(face_snap);
                drop(voice_snap);

                let face_ok = stored_face
                    .as_deref()
                    .is_some_and(|s| self.face_verifier.verify(face, s));
                let voice_ok = stored_voice
                    .as_deref()
                    .is_some_and(|s| self.voice_verifier.verify(voice, s));
                debug!(
                    "face candidate {face_id} verified={face_ok}, voice candidate {voice_id} verified={voice_ok}"
                );

                match decide(face_id == voice_id, face_ok, voice_ok) {
                    Decision::Authorize => MatchOutcome::Authorized(face_id),
                    Decision::Enroll => self.enroll(face, voice),
                    Decision::Reject(reason) => MatchOutcome::Rejected(reason),
                }
            }
        }
    }

    /// Register a new identity in both indexes and the identity store, or
    /// in none of them.
    fn enroll(&self, face: &[f32], voice: &[f32]) -> MatchOutcome {
        let failed = MatchOutcome::Failed(FailureReason::EnrollmentFailed);

        let id = match self.allocate_id() {
            Ok(id) => id,
            Err(e) => {
                error!("enrollment: could not allocate identity id: {e}");
                return failed;
            }
        };

        if let Err(e) = self.ctx.face.insert(id, face) {
            warn!("enrollment of {id}: face insert failed: {e}");
            return failed;
        }
        if let Err(e) = self.ctx.voice.insert(id, voice) {
            warn!("enrollment of {id}: voice insert failed, rolling back face: {e}");
            self.rollback_insert(&self.ctx.face, id);
            return failed;
        }
        if let Err(e) = self.ctx.identities.create_identity(id) {
            warn!("enrollment of {id}: identity record failed, rolling back both: {e}");
            self.rollback_insert(&self.ctx.face, id);
            self.rollback_insert(&self.ctx.voice, id);
            return failed;
        }

        MatchOutcome::Enrolled(id)
    }

    /// Allocate an ID that neither index already holds.
    ///
    /// Index entries without an identity record (a snapshot seeded into an
    /// empty store, or a failed rollback) are skipped, never overwritten.
    /// `next_id` is strictly increasing, so at most one call per indexed ID
    /// can collide.
    fn allocate_id(&self) -> Result<IdentityId, EngineError> {
        let taken = self.ctx.face.len() + self.ctx.voice.len();
        for _ in 0..=taken {
            let id = self.ctx.identities.next_id()?;
            if !self.ctx.face.contains(id) && !self.ctx.voice.contains(id) {
                return Ok(id);
            }
            warn!("enrollment: identity id {id} is already indexed, allocating another");
        }
        Err(EngineError::Identity(
            "every allocated identity id is already indexed".into(),
        ))
    }

    fn rollback_insert(&self, index: &IndexManager, id: IdentityId) {
        if let Err(e) = index.delete(id) {
            error!(
                "rollback of {id} in {} index failed, identity left partially registered: {e}",
                index.name()
            );
        }
    }

    /// Remove an identity from both indexes and the identity store.
    ///
    /// Succeeds only if all three removals succeed; otherwise the removals
    /// already applied are undone and an error is returned. Index entries
    /// left without a record count as removed once both deletes succeed.
    pub fn remove_identity(&self, id: IdentityId) -> Result<(), EngineError> {
        let face_vec = self.ctx.face.vector_of(id);
        let voice_vec = self.ctx.voice.vector_of(id);

        self.ctx.face.delete(id).map_err(|e| removal(id, e))?;

        if let Err(e) = self.ctx.voice.delete(id) {
            self.restore(&self.ctx.face, id, face_vec.as_deref());
            return Err(removal(id, e));
        }

        let result = match self.ctx.identities.delete_identity(id) {
            Ok(true) => Ok(()),
            Ok(false) if face_vec.is_some() || voice_vec.is_some() => {
                warn!("identity {id} had index entries but no record, purged them");
                Ok(())
            }
            Ok(false) => Err(EngineError::IdentityNotFound(id)),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.restore(&self.ctx.face, id, face_vec.as_deref());
            self.restore(&self.ctx.voice, id, voice_vec.as_deref());
        } else {
            info!("removed identity {id}");
        }
        result
    }

    fn restore(&self, index: &IndexManager, id: IdentityId, vector: Option<&[f32]>) {
        let Some(v) = vector else { return };
        if let Err(e) = index.insert(id, v) {
            error!(
                "restore of {id} in {} index failed after aborted removal: {e}",
                index.name()
            );
        }
    }

    /// Look up the record of an identity.
    pub fn identity(&self, id: IdentityId) -> Result<Option<IdentityRecord>, EngineError> {
        self.ctx.identities.get_identity(id)
    }
}

fn lookup(
    face_snap: &Forest,
    voice_snap: &Forest,
    face: &[f32],
    voice: &[f32],
) -> Result<Candidates, VecError> {
    let face_hit = face_snap.query(face, 1)?.first().map(|n| n.id);
    let voice_hit = voice_snap.query(voice, 1)?.first().map(|n| n.id);
    Ok(match (face_hit, voice_hit) {
        (Some(face), Some(voice)) => Candidates::Dual { face, voice },
        (None, None) => Candidates::None,
        _ => Candidates::Single,
    })
}

fn removal(id: IdentityId, e: VecError) -> EngineError {
    EngineError::RemovalFailed {
        id,
        reason: e.to_string(),
    }
}
