//! Metric rating thresholds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::vitals::types::{MetricName, Rating};

/// A `{good, poor}` threshold pair. Values at or below `good` rate good,
/// values above `poor` rate poor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub good: f64,
    pub poor: f64,
}

impl Thresholds {
    pub const fn new(good: f64, poor: f64) -> Self {
        Self { good, poor }
    }

    pub fn rate(&self, value: f64) -> Rating {
        if value <= self.good {
            Rating::Good
        } else if value <= self.poor {
            Rating::NeedsImprovement
        } else {
            Rating::Poor
        }
    }

    /// Both bounds non-negative and finite, and `good < poor`.
    pub fn is_valid(&self) -> bool {
        self.good.is_finite()
            && self.poor.is_finite()
            && self.good >= 0.0
            && self.poor >= 0.0
            && self.good < self.poor
    }
}

/// Default thresholds for a core metric.
pub fn default_thresholds(name: &MetricName) -> Option<Thresholds> {
    match name {
        MetricName::Lcp => Some(Thresholds::new(2500.0, 4000.0)),
        MetricName::Cls => Some(Thresholds::new(0.1, 0.25)),
        MetricName::Fcp => Some(Thresholds::new(1800.0, 3000.0)),
        MetricName::Inp => Some(Thresholds::new(200.0, 500.0)),
        MetricName::Ttfb => Some(Thresholds::new(800.0, 1800.0)),
        MetricName::Other(_) => None,
    }
}

/// Per-metric threshold table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingThresholds(BTreeMap<MetricName, Thresholds>);

impl Default for RatingThresholds {
    fn default() -> Self {
        Self(
            MetricName::CORE
                .into_iter()
                .filter_map(|name| default_thresholds(&name).map(|t| (name, t)))
                .collect(),
        )
    }
}

impl RatingThresholds {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &MetricName) -> Option<Thresholds> {
        self.0.get(name).copied()
    }

    pub fn set(&mut self, name: MetricName, thresholds: Thresholds) {
        self.0.insert(name, thresholds);
    }

    pub fn remove(&mut self, name: &MetricName) -> Option<Thresholds> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricName, &Thresholds)> {
        self.0.iter()
    }

    /// Rate a value. Metrics without thresholds rate `needs-improvement`.
    pub fn rate(&self, name: &MetricName, value: f64) -> Rating {
        self.get(name)
            .map(|t| t.rate(value))
            .unwrap_or(Rating::NeedsImprovement)
    }
}

impl FromIterator<(MetricName, Thresholds)> for RatingThresholds {
    fn from_iter<I: IntoIterator<Item = (MetricName, Thresholds)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Rate a value against the default thresholds.
pub fn calculate_rating(name: &MetricName, value: f64) -> Rating {
    default_thresholds(name)
        .map(|t| t.rate(value))
        .unwrap_or(Rating::NeedsImprovement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcp_ratings() {
        assert_eq!(calculate_rating(&MetricName::Lcp, 1500.0), Rating::Good);
        assert_eq!(calculate_rating(&MetricName::Lcp, 2500.0), Rating::Good);
        assert_eq!(calculate_rating(&MetricName::Lcp, 3000.0), Rating::NeedsImprovement);
        assert_eq!(calculate_rating(&MetricName::Lcp, 4000.1), Rating::Poor);
    }

    #[test]
    fn test_cls_uses_unitless_thresholds() {
        assert_eq!(calculate_rating(&MetricName::Cls, 0.05), Rating::Good);
        assert_eq!(calculate_rating(&MetricName::Cls, 0.2), Rating::NeedsImprovement);
        assert_eq!(calculate_rating(&MetricName::Cls, 0.3), Rating::Poor);
    }

    #[test]
    fn test_unknown_metric_defaults() {
        assert_eq!(calculate_rating(&MetricName::from("FID"), 0.0), Rating::NeedsImprovement);
    }

    #[test]
    fn test_injected_thresholds_override() {
        let mut table = RatingThresholds::default();
        table.set(MetricName::Lcp, Thresholds::new(1000.0, 2000.0));
        assert_eq!(table.rate(&MetricName::Lcp, 1500.0), Rating::NeedsImprovement);
        assert_eq!(table.rate(&MetricName::Ttfb, 100.0), Rating::Good);
    }

    #[test]
    fn test_threshold_validity() {
        assert!(Thresholds::new(1.0, 2.0).is_valid());
        assert!(!Thresholds::new(2.0, 2.0).is_valid());
        assert!(!Thresholds::new(-1.0, 2.0).is_valid());
        assert!(!Thresholds::new(f64::NAN, 2.0).is_valid());
    }

    #[test]
    fn test_table_serializes_by_metric_name() {
        let json = serde_json::to_value(RatingThresholds::default()).unwrap();
        assert_eq!(json["LCP"]["good"], 2500.0);
        assert_eq!(json["CLS"]["poor"], 0.25);
    }
}
