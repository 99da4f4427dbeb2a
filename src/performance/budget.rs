//! Performance budget checks.

use serde::{Deserialize, Serialize};

use crate::vitals::{EnhancedMetric, MetricName, RatingThresholds, Thresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Warning,
    Error,
}

impl ViolationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationSeverity::Warning => "warning",
            ViolationSeverity::Error => "error",
        }
    }
}

/// A metric value over its budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetViolation {
    pub metric: MetricName,
    pub value: f64,
    /// The bound that was crossed: `poor` for errors, `good` for warnings.
    pub threshold: f64,
    pub severity: ViolationSeverity,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Severity and crossed bound for one value, or `None` within budget.
pub fn check_budget(value: f64, thresholds: &Thresholds) -> Option<(ViolationSeverity, f64)> {
    if value > thresholds.poor {
        Some((ViolationSeverity::Error, thresholds.poor))
    } else if value > thresholds.good {
        Some((ViolationSeverity::Warning, thresholds.good))
    } else {
        None
    }
}

/// Violations for every metric that has a threshold and exceeds it.
/// Metrics without a configured threshold are skipped.
pub fn calculate_budget_violations(
    metrics: &[EnhancedMetric],
    thresholds: &RatingThresholds,
) -> Vec<BudgetViolation> {
    metrics
        .iter()
        .filter_map(|metric| {
            let bounds = thresholds.get(&metric.name)?;
            let (severity, threshold) = check_budget(metric.value, &bounds)?;
            Some(BudgetViolation {
                metric: metric.name.clone(),
                value: metric.value,
                threshold,
                severity,
                timestamp: metric.timestamp.clone(),
                url: Some(metric.url.clone()).filter(|u| !u.is_empty()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::vitals::Rating;
    use proptest::prelude::*;

    fn metric(name: &str, value: f64) -> EnhancedMetric {
        EnhancedMetric {
            name: MetricName::from(name),
            value,
            rating: Rating::Good,
            delta: None,
            id: None,
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            url: "https://example.com/".into(),
            user_agent: String::new(),
            correlation_id: CorrelationId::generate(),
            device_memory: None,
            connection_type: None,
        }
    }

    #[test]
    fn test_lcp_over_poor_is_error() {
        let mut thresholds = RatingThresholds::empty();
        thresholds.set(MetricName::Lcp, Thresholds::new(2500.0, 4000.0));

        let violations = calculate_budget_violations(&[metric("LCP", 5000.0)], &thresholds);
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.metric, MetricName::Lcp);
        assert_eq!(v.value, 5000.0);
        assert_eq!(v.threshold, 4000.0);
        assert_eq!(v.severity, ViolationSeverity::Error);
        assert_eq!(v.url.as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn test_mixed_metrics() {
        let metrics = [metric("LCP", 3000.0), metric("CLS", 0.05), metric("FID", 900.0)];
        let violations = calculate_budget_violations(&metrics, &RatingThresholds::default());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, ViolationSeverity::Warning);
        assert_eq!(violations[0].threshold, 2500.0);
    }

    #[test]
    fn test_violation_serializes_lowercase() {
        let violations = calculate_budget_violations(&[metric("INP", 600.0)], &RatingThresholds::default());
        let json = serde_json::to_value(&violations[0]).unwrap();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["metric"], "INP");
    }

    proptest! {
        #[test]
        fn prop_budget_monotonic(good in 0.0f64..1000.0, gap in 0.001f64..1000.0, value in 0.0f64..3000.0) {
            let bounds = Thresholds::new(good, good + gap);
            match check_budget(value, &bounds) {
                None => prop_assert!(value <= bounds.good),
                Some((ViolationSeverity::Warning, t)) => {
                    prop_assert!(value > bounds.good && value <= bounds.poor);
                    prop_assert_eq!(t, bounds.good);
                }
                Some((ViolationSeverity::Error, t)) => {
                    prop_assert!(value > bounds.poor);
                    prop_assert_eq!(t, bounds.poor);
                }
            }
        }
    }
}
