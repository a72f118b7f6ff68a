use curator_core::NearDuplicateConfig;

use crate::audit::MatchRule;

/// Normalized Levenshtein ratio in `0.0..=1.0`.
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Normalized title and description of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMatch {
    pub rule: MatchRule,
    pub title: f64,
    pub description: f64,
}

/// Pair rule for the near-duplicate tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearRule {
    title_threshold: f64,
    paired_title_threshold: f64,
    paired_description_threshold: f64,
}

impl Default for NearRule {
    fn default() -> Self {
        Self::new(&NearDuplicateConfig::default())
    }
}

impl NearRule {
    pub fn new(config: &NearDuplicateConfig) -> Self {
        Self {
            title_threshold: config.title_threshold.clamp(0.0, 1.0),
            paired_title_threshold: config.paired_title_threshold.clamp(0.0, 1.0),
            paired_description_threshold: config.paired_description_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn with_title_threshold(mut self, threshold: f64) -> Self {
        self.title_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn title_threshold(&self) -> f64 {
        self.title_threshold
    }

    pub fn evaluate(&self, a: &Signature, b: &Signature) -> Option<PairMatch> {
        if a.title.is_empty() || b.title.is_empty() {
            return None;
        }

        let title = ratio(&a.title, &b.title);
        if title >= self.title_threshold {
            return Some(PairMatch {
                rule: MatchRule::NearTitle,
                title,
                description: ratio(&a.description, &b.description),
            });
        }

        if title >= self.paired_title_threshold {
            let description = ratio(&a.description, &b.description);
            if description >= self.paired_description_threshold {
                return Some(PairMatch {
                    rule: MatchRule::NearTitleAndDescription,
                    title,
                    description,
                });
            }
        }

        None
    }
}
