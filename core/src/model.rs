//! Presence inference seam.
//!
//! The pipeline exposes feature vectors; what turns them into a
//! presence call is pluggable so the station binary can swap a trained
//! model in without touching the capture path.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceLabel {
    Absent,
    Present,
}

/// Maps one feature window to a presence label with a confidence in
/// `[0, 1]`.
pub trait PresenceModel: Send + Sync {
    fn predict(&self, features: &[f64]) -> (PresenceLabel, f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAbsent;

    impl PresenceModel for AlwaysAbsent {
        fn predict(&self, _features: &[f64]) -> (PresenceLabel, f64) {
            (PresenceLabel::Absent, 1.0)
        }
    }

    #[test]
    fn trait_objects_are_usable_across_threads() {
        let model: Box<dyn PresenceModel> = Box::new(AlwaysAbsent);
        let (label, confidence) = model.predict(&[0.0; 8]);
        assert_eq!(label, PresenceLabel::Absent);
        assert_eq!(confidence, 1.0);
    }
}
