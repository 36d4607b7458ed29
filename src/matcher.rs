use digid_vision::FaceDescriptor;
use serde::Serialize;

use crate::error::{Error, Result};

/// Largest distance (exclusive) still accepted as the same face.
pub const MATCH_THRESHOLD: f32 = 0.5;

/// Distance reported when there is nothing to compare against.
pub const NO_REFERENCE_DISTANCE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub is_match: bool,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Match(VerificationOutcome),
    Mismatch(VerificationOutcome),
    /// No reference was enrolled; never a match.
    NoReference(VerificationOutcome),
}

impl Verdict {
    pub fn outcome(&self) -> VerificationOutcome {
        match *self {
            Verdict::Match(o) | Verdict::Mismatch(o) | Verdict::NoReference(o) => o,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match(_))
    }

    /// Turn the failure verdicts into their error class.
    pub fn into_result(self, email: &str) -> Result<VerificationOutcome> {
        match self {
            Verdict::Match(o) => Ok(o),
            Verdict::Mismatch(o) => Err(Error::Mismatch {
                distance: o.distance,
            }),
            Verdict::NoReference(_) => Err(Error::NoReference(email.to_string())),
        }
    }
}

pub fn is_match(distance: f32) -> bool {
    distance < MATCH_THRESHOLD
}

pub fn compare(reference: Option<&FaceDescriptor>, candidate: &FaceDescriptor) -> Result<Verdict> {
    let Some(reference) = reference else {
        return Ok(Verdict::NoReference(VerificationOutcome {
            is_match: false,
            distance: NO_REFERENCE_DISTANCE,
        }));
    };
    let distance = reference
        .distance(candidate)
        .map_err(|e| Error::Descriptor(e.to_string()))?;
    let outcome = VerificationOutcome {
        is_match: is_match(distance),
        distance,
    };
    log::debug!(
        "descriptor distance {:.4} (threshold {:.2})",
        distance,
        MATCH_THRESHOLD
    );
    Ok(if outcome.is_match {
        Verdict::Match(outcome)
    } else {
        Verdict::Mismatch(outcome)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use digid_vision::DESCRIPTOR_LEN;

    fn descriptor(values: Vec<f32>) -> FaceDescriptor {
        FaceDescriptor::new(values).unwrap()
    }

    /// Zero vector and a vector whose first component alone sets the distance.
    fn pair_at(distance: f32) -> (FaceDescriptor, FaceDescriptor) {
        let a = descriptor(vec![0.0; DESCRIPTOR_LEN]);
        let mut b = vec![0.0; DESCRIPTOR_LEN];
        b[0] = distance;
        (a, descriptor(b))
    }

    #[test]
    fn threshold_is_strict() {
        assert!(is_match(0.0));
        assert!(is_match(0.4999));
        assert!(!is_match(0.5));
        assert!(!is_match(0.7));
    }

    #[test]
    fn identical_descriptors_match_at_zero() {
        let mut values = vec![0.2; DESCRIPTOR_LEN];
        values[0] = 0.1;
        values[DESCRIPTOR_LEN - 1] = 0.1;
        let enrolled = descriptor(values.clone());
        let verdict = compare(Some(&enrolled), &descriptor(values)).unwrap();
        assert_eq!(
            verdict,
            Verdict::Match(VerificationOutcome {
                is_match: true,
                distance: 0.0
            })
        );
    }

    #[test]
    fn far_descriptor_is_a_mismatch() {
        let (a, b) = pair_at(0.7);
        let verdict = compare(Some(&a), &b).unwrap();
        assert!(matches!(verdict, Verdict::Mismatch(_)));
        let outcome = verdict.outcome();
        assert!(!outcome.is_match);
        assert!((outcome.distance - 0.7).abs() < 1e-6);
    }

    #[test]
    fn exactly_threshold_is_rejected() {
        let (a, b) = pair_at(0.5);
        assert!(!compare(Some(&a), &b).unwrap().is_match());
    }

    #[test]
    fn just_under_threshold_is_accepted() {
        let (a, b) = pair_at(0.49);
        assert!(compare(Some(&a), &b).unwrap().is_match());
    }

    #[test]
    fn missing_reference_never_matches() {
        for fill in [0.0, 0.3, 1.0] {
            let candidate = descriptor(vec![fill; DESCRIPTOR_LEN]);
            let verdict = compare(None, &candidate).unwrap();
            assert_eq!(
                verdict,
                Verdict::NoReference(VerificationOutcome {
                    is_match: false,
                    distance: 1.0
                })
            );
        }
    }

    #[test]
    fn failure_verdicts_map_to_distinct_errors() {
        let (a, b) = pair_at(0.7);
        let mismatch = compare(Some(&a), &b).unwrap();
        assert!(matches!(
            mismatch.into_result("a@b.c"),
            Err(Error::Mismatch { .. })
        ));
        let none = compare(None, &b).unwrap();
        assert!(matches!(none.into_result("a@b.c"), Err(Error::NoReference(_))));
    }

    #[test]
    fn short_candidate_cannot_be_built() {
        assert!(FaceDescriptor::new(vec![0.0; 64]).is_err());
    }
}
