//! Metric table descriptors
//!
//! Each usage metric is stored as an identity table (one row per series)
//! and a continuous-aggregate table of 10 minute buckets.

/// Columns that identify a series in its identity table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityLayout {
    /// `namespace`, `pod`, `container`
    Container,
    /// `domain`
    Domain,
}

/// Where one named metric lives in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTable {
    pub metric: String,
    pub identity_table: String,
    pub bucket_table: String,
    pub layout: IdentityLayout,
}

impl MetricTable {
    pub fn new(
        metric: impl Into<String>,
        identity_table: impl Into<String>,
        bucket_table: impl Into<String>,
        layout: IdentityLayout,
    ) -> Self {
        Self {
            metric: metric.into(),
            identity_table: identity_table.into(),
            bucket_table: bucket_table.into(),
            layout,
        }
    }
}

/// Container usage metrics: cpu rate and memory working set
pub fn container_metric_tables() -> Vec<MetricTable> {
    vec![
        MetricTable::new(
            "cpu",
            "prom_series.container:container_cpu_usage:rate",
            ":container_cpu_usage:10min",
            IdentityLayout::Container,
        ),
        MetricTable::new(
            "memory",
            "prom_series.container_memory_working_set_bytes",
            ":container_memory_working_set_bytes:10min",
            IdentityLayout::Container,
        ),
    ]
}

/// Vm usage metrics reported by libvirt
pub fn vm_metric_tables() -> Vec<MetricTable> {
    vec![MetricTable::new(
        "memory",
        "prom_series.libvirt_domain_info_memory_usage_bytes",
        ":libvirt_domain_info_memory_usage_bytes:10min",
        IdentityLayout::Domain,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{POD_RESOURCES, VM_RESOURCES};

    #[test]
    fn test_tables_cover_tracked_resources() {
        let container: Vec<_> = container_metric_tables()
            .into_iter()
            .map(|t| t.metric)
            .collect();
        assert_eq!(container, POD_RESOURCES);

        let vm: Vec<_> = vm_metric_tables().into_iter().map(|t| t.metric).collect();
        assert_eq!(vm, VM_RESOURCES);
    }
}
