//! Confidence Scorer (C7).
//!
//! A pure function: given retrieved similarities, derives a coarse confidence
//! band. No I/O, no state — trivially unit-testable.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Confidence {
    pub level: ConfidenceLevel,
    pub label: String,
    pub color: String,
    pub average_similarity: f32,
    pub top_similarity: f32,
    pub supporting_chunks: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceThresholds {
    pub high: f32,
    pub medium: f32,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.60,
            medium: 0.40,
        }
    }
}

fn level_attrs(level: ConfidenceLevel) -> (&'static str, &'static str) {
    match level {
        ConfidenceLevel::High => ("High confidence", "green"),
        ConfidenceLevel::Medium => ("Moderate confidence", "yellow"),
        ConfidenceLevel::Low => ("Low confidence", "red"),
    }
}

/// Computes a confidence band from a set of retrieved similarities.
pub fn score(similarities: &[f32], thresholds: ConfidenceThresholds) -> Confidence {
    let n = similarities.len();

    if n == 0 {
        let (label, color) = level_attrs(ConfidenceLevel::Low);
        return Confidence {
            level: ConfidenceLevel::Low,
            label: label.to_string(),
            color: color.to_string(),
            average_similarity: 0.0,
            top_similarity: 0.0,
            supporting_chunks: 0,
            reason: "No supporting content was retrieved".to_string(),
        };
    }

    let top = similarities.iter().cloned().fold(f32::MIN, f32::max);
    let average = similarities.iter().sum::<f32>() / n as f32;

    let level = if top >= thresholds.high && n >= 2 {
        ConfidenceLevel::High
    } else if top >= thresholds.medium || n == 1 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    let reason = match level {
        ConfidenceLevel::High => {
            format!("Strong match across {n} supporting passages")
        }
        ConfidenceLevel::Medium => "Partial match in the available sources".to_string(),
        ConfidenceLevel::Low => "Weak match in the available sources".to_string(),
    };

    let (label, color) = level_attrs(level);
    Confidence {
        level,
        label: label.to_string(),
        color: color.to_string(),
        average_similarity: average,
        top_similarity: top,
        supporting_chunks: n,
        reason,
    }
}

/// The synthetic confidence emitted for answer-cache hits (C8 step 1).
pub fn cache_hit() -> Confidence {
    Confidence {
        level: ConfidenceLevel::High,
        label: "High confidence".to_string(),
        color: "green".to_string(),
        average_similarity: 1.0,
        top_similarity: 1.0,
        supporting_chunks: 0,
        reason: "Served from answer cache".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_low_with_distinct_reason() {
        let c = score(&[], ConfidenceThresholds::default());
        assert_eq!(c.level, ConfidenceLevel::Low);
        assert!(c.reason.contains("No supporting content"));
    }

    #[test]
    fn high_requires_top_and_count() {
        let c = score(&[0.9, 0.8], ConfidenceThresholds::default());
        assert_eq!(c.level, ConfidenceLevel::High);
    }

    #[test]
    fn single_high_score_is_only_medium() {
        let c = score(&[0.95], ConfidenceThresholds::default());
        assert_eq!(c.level, ConfidenceLevel::Medium);
    }

    #[test]
    fn low_when_below_medium_threshold() {
        let c = score(&[0.1, 0.2], ConfidenceThresholds::default());
        assert_eq!(c.level, ConfidenceLevel::Low);
    }

    #[test]
    fn higher_top_similarity_never_lowers_confidence() {
        let low = score(&[0.2, 0.3], ConfidenceThresholds::default());
        let high = score(&[0.9, 0.3], ConfidenceThresholds::default());
        assert_eq!(low.level, ConfidenceLevel::Low);
        assert_eq!(high.level, ConfidenceLevel::High);
    }
}
