use std::collections::BTreeMap;

/// One detected pest instance.
///
/// Coordinates are normalized 0..1 over the model input frame, ordered
/// `[x1, y1, x2, y2]`.
#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// Result of one detection run against a single frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionOutcome {
    pub detections: Vec<Detection>,
    /// Inference wall time in milliseconds.
    pub inference_ms: f64,
}

impl DetectionOutcome {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Per-class instance counts for a run.
///
/// A detection whose class id falls outside the configured name list is
/// dropped from the mapping (the model and the configuration disagree;
/// the caller logs the mismatch).
pub fn class_counts(outcome: &DetectionOutcome, class_names: &[String]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for det in &outcome.detections {
        let Some(name) = class_names.get(det.class_id) else {
            continue;
        };
        *counts.entry(name.clone()).or_insert(0u32) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize) -> Detection {
        Detection {
            bbox: [0.1, 0.1, 0.3, 0.3],
            confidence: 0.9,
            class_id,
        }
    }

    #[test]
    fn counts_group_by_class_name() {
        let outcome = DetectionOutcome {
            detections: vec![det(0), det(1), det(0), det(0)],
            inference_ms: 0.0,
        };
        let names = vec!["tuta".to_string(), "bactericera".to_string()];
        let counts = class_counts(&outcome, &names);
        assert_eq!(counts["tuta"], 3);
        assert_eq!(counts["bactericera"], 1);
    }

    #[test]
    fn unknown_class_ids_are_dropped() {
        let outcome = DetectionOutcome {
            detections: vec![det(0), det(7)],
            inference_ms: 0.0,
        };
        let names = vec!["tuta".to_string()];
        let counts = class_counts(&outcome, &names);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["tuta"], 1);
    }
}
