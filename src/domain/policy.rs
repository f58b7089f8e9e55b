//! Moderation decision rules and checks on classifier output.

use crate::domain::jobs::ModerationLabel;

/// Category recorded when a remote decider rejects without naming one.
pub const UNSPECIFIED_CATEGORY: &str = "unspecified";

/// Outcome of a decision function, before it is bound to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub approved: bool,
    pub flagged_categories: Vec<String>,
}

impl Decision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            flagged_categories: Vec::new(),
        }
    }

    pub fn reject(categories: Vec<String>) -> Self {
        let mut categories = dedup(categories);
        if categories.is_empty() {
            categories.push(UNSPECIFIED_CATEGORY.to_string());
        }
        Self {
            approved: false,
            flagged_categories: categories,
        }
    }

    /// Drops blank and duplicate categories; a rejection always names one.
    pub fn normalized(self) -> Self {
        if self.approved {
            Self {
                approved: true,
                flagged_categories: dedup(self.flagged_categories),
            }
        } else {
            Self::reject(self.flagged_categories)
        }
    }
}

/// Local decision function: a label flags the video when its confidence
/// reaches `min_confidence` and its name or parent is blocked. An empty
/// block-list blocks every label that reaches the threshold.
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    pub blocked_categories: Vec<String>,
    pub min_confidence: f32,
}

impl ThresholdPolicy {
    pub fn new(blocked_categories: Vec<String>, min_confidence: f32) -> Self {
        Self {
            blocked_categories,
            min_confidence,
        }
    }

    pub fn decide(&self, labels: &[ModerationLabel]) -> Decision {
        let flagged: Vec<String> = labels
            .iter()
            .filter(|label| label.confidence >= self.min_confidence)
            .filter(|label| self.is_blocked(label))
            .map(|label| label.category().to_string())
            .collect();

        if flagged.is_empty() {
            Decision::approve()
        } else {
            Decision::reject(flagged)
        }
    }

    fn is_blocked(&self, label: &ModerationLabel) -> bool {
        if self.blocked_categories.is_empty() {
            return true;
        }
        self.blocked_categories.iter().any(|blocked| {
            blocked.eq_ignore_ascii_case(&label.name)
                || label
                    .parent
                    .as_deref()
                    .is_some_and(|p| blocked.eq_ignore_ascii_case(p))
        })
    }
}

/// Classifier output is untrusted: names must be present and confidences
/// must be finite percentages.
pub fn validate_labels(labels: &[ModerationLabel]) -> Result<(), String> {
    for label in labels {
        if label.name.trim().is_empty() {
            return Err("label without a name".to_string());
        }
        if !label.confidence.is_finite() || !(0.0..=100.0).contains(&label.confidence) {
            return Err(format!(
                "label '{}' has confidence {} outside 0-100",
                label.name, label.confidence
            ));
        }
    }
    Ok(())
}

fn dedup(categories: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(categories.len());
    for category in categories {
        let category = category.trim().to_string();
        if category.is_empty() {
            continue;
        }
        if !out.iter().any(|c| c.eq_ignore_ascii_case(&category)) {
            out.push(category);
        }
    }
    out
}
