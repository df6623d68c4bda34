//! Allocation classification of usage against declared quota

use crate::models::ResourceUsage;
use serde::{Deserialize, Serialize};

/// Relative deviation below which usage counts as matching its quota
pub const ALLOCATION_EPSILON: f64 = 0.2;

/// Standard quota value reported when neither request nor limit is declared
pub const UNKNOWN_STANDARD: f64 = -1.0;

/// Minimum samples before a per-resource health status is reported
pub const HEALTH_MIN_SAMPLES: usize = 100;

/// Allocation classification of current usage against the standard quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Allocation {
    Optimized,
    Underallocated,
    Overallocated,
    /// No quota declared; excluded from histograms
    Unknown,
}

impl Allocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Allocation::Optimized => "optimized",
            Allocation::Underallocated => "underallocated",
            Allocation::Overallocated => "overallocated",
            Allocation::Unknown => "unknown",
        }
    }
}

/// Coarse per-resource health reported alongside long usage histories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Inefficient,
}

/// Request if declared, else limit if declared, else [`UNKNOWN_STANDARD`]
pub fn standard_quota(usage: &ResourceUsage) -> f64 {
    if usage.request != 0.0 {
        usage.request
    } else if usage.limit != 0.0 {
        usage.limit
    } else {
        UNKNOWN_STANDARD
    }
}

fn within_epsilon(current: f64, standard: f64) -> bool {
    (current - standard).abs() / standard < ALLOCATION_EPSILON
}

/// Classify current usage against a standard quota
pub fn classify(current: f64, standard: f64) -> Allocation {
    if standard == UNKNOWN_STANDARD {
        return Allocation::Unknown;
    }
    if within_epsilon(current, standard) {
        Allocation::Optimized
    } else if current < standard {
        Allocation::Underallocated
    } else {
        Allocation::Overallocated
    }
}

/// Health of a resource with enough history; short series report unknown
pub fn health_status(usage: &ResourceUsage, min_samples: usize) -> HealthStatus {
    if usage.sample_count() < min_samples {
        return HealthStatus::Unknown;
    }
    let standard = standard_quota(usage);
    if standard == UNKNOWN_STANDARD {
        return HealthStatus::Unknown;
    }
    if within_epsilon(usage.current_usage(), standard) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Inefficient
    }
}
