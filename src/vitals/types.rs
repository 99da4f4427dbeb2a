//! Metric types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationId;

/// Metric identifier. The five Core Web Vitals are named; anything else a
/// host reports is carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricName {
    Lcp,
    Cls,
    Fcp,
    Inp,
    Ttfb,
    Other(String),
}

impl MetricName {
    pub const CORE: [MetricName; 5] = [
        MetricName::Lcp,
        MetricName::Cls,
        MetricName::Fcp,
        MetricName::Inp,
        MetricName::Ttfb,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            MetricName::Lcp => "LCP",
            MetricName::Cls => "CLS",
            MetricName::Fcp => "FCP",
            MetricName::Inp => "INP",
            MetricName::Ttfb => "TTFB",
            MetricName::Other(name) => name,
        }
    }

    /// Unit suffix for human-readable values.
    pub fn unit(&self) -> &'static str {
        match self {
            MetricName::Cls => "",
            _ => "ms",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MetricName {
    fn from(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "LCP" => MetricName::Lcp,
            "CLS" => MetricName::Cls,
            "FCP" => MetricName::Fcp,
            "INP" => MetricName::Inp,
            "TTFB" => MetricName::Ttfb,
            _ => MetricName::Other(name.to_string()),
        }
    }
}

impl From<String> for MetricName {
    fn from(name: String) -> Self {
        MetricName::from(name.as_str())
    }
}

impl From<MetricName> for String {
    fn from(name: MetricName) -> Self {
        name.as_str().to_string()
    }
}

impl FromStr for MetricName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(MetricName::from(s))
    }
}

/// Quality classification of a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Good => "good",
            Rating::NeedsImprovement => "needs-improvement",
            Rating::Poor => "poor",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sample as reported by the measurement source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetric {
    pub name: MetricName,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RawMetric {
    pub fn new(name: impl Into<MetricName>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            rating: None,
            delta: None,
            id: None,
        }
    }
}

/// A sample augmented with rating and context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedMetric {
    pub name: MetricName,
    pub value: f64,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user_agent: String,
    pub correlation_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_memory: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
}

/// Which metric sources `setup` subscribes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    pub lcp: bool,
    pub cls: bool,
    pub fcp: bool,
    pub inp: bool,
    pub ttfb: bool,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            lcp: true,
            cls: true,
            fcp: true,
            inp: true,
            ttfb: true,
        }
    }
}

impl VitalsConfig {
    pub fn enabled(&self) -> Vec<MetricName> {
        let flags = [self.lcp, self.cls, self.fcp, self.inp, self.ttfb];
        MetricName::CORE
            .into_iter()
            .zip(flags)
            .filter_map(|(name, on)| on.then_some(name))
            .collect()
    }
}
