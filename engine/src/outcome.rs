use std::fmt;

use biogate_vecstore::IdentityId;
use serde::Serialize;

/// Terminal result of one authenticate-or-enroll request.
///
/// Every request ends in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Both modalities matched and verified the same existing identity.
    Authorized(IdentityId),
    /// No existing identity matched; a new one was registered in both
    /// modalities.
    Enrolled(IdentityId),
    /// The request was refused without changing any index.
    Rejected(RejectReason),
    /// The request could not be completed; no partial state remains.
    Failed(FailureReason),
}

impl MatchOutcome {
    /// The identity the caller may proceed as, if any.
    pub fn identity(&self) -> Option<IdentityId> {
        match self {
            Self::Authorized(id) | Self::Enrolled(id) => Some(*id),
            Self::Rejected(_) | Self::Failed(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.identity().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Upstream extraction produced no vector for at least one modality.
    ExtractionFailed,
    /// Exactly one modality verified its candidate.
    VerificationAmbiguous,
    /// Both modalities verified, but against different identities.
    ModalityDisagreement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A captured vector does not have its modality's dimensionality.
    DimensionMismatch,
    /// Enrollment could not complete in every store and was rolled back.
    EnrollmentFailed,
    /// Media was supplied but no extractor is configured.
    ExtractorUnavailable,
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorized(id) => write!(f, "authorized({id})"),
            Self::Enrolled(id) => write!(f, "enrolled({id})"),
            Self::Rejected(r) => write!(f, "rejected({r})"),
            Self::Failed(r) => write!(f, "failed({r})"),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtractionFailed => write!(f, "extraction_failed"),
            Self::VerificationAmbiguous => write!(f, "verification_ambiguous"),
            Self::ModalityDisagreement => write!(f, "modality_disagreement"),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch => write!(f, "dimension_mismatch"),
            Self::EnrollmentFailed => write!(f, "enrollment_failed"),
            Self::ExtractorUnavailable => write!(f, "extractor_unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_display() {
        assert_eq!(MatchOutcome::Authorized(7).to_string(), "authorized(7)");
        assert_eq!(
            MatchOutcome::Rejected(RejectReason::ModalityDisagreement).to_string(),
            "rejected(modality_disagreement)"
        );
        assert_eq!(
            MatchOutcome::Failed(FailureReason::EnrollmentFailed).to_string(),
            "failed(enrollment_failed)"
        );
    }

    #[test]
    fn outcome_identity() {
        assert_eq!(MatchOutcome::Enrolled(3).identity(), Some(3));
        assert!(!MatchOutcome::Rejected(RejectReason::ExtractionFailed).is_success());
    }

    #[test]
    fn outcome_json() {
        let v = serde_json::to_value(MatchOutcome::Authorized(7)).unwrap();
        assert_eq!(v, serde_json::json!({"outcome": "authorized", "detail": 7}));

        let v = serde_json::to_value(MatchOutcome::Rejected(RejectReason::VerificationAmbiguous))
            .unwrap();
        assert_eq!(
            v,
            serde_json::json!({"outcome": "rejected", "detail": "verification_ambiguous"})
        );
    }
}
