//! Container to pod rollup

use crate::models::{ContainerRecord, PodRecord, ResourceUsage};
use std::collections::BTreeMap;

/// Group containers by owning pod and sum their request, limit and current
/// usage per resource. Pods come back sorted by (namespace, name).
pub fn rollup_pods(containers: Vec<ContainerRecord>) -> Vec<PodRecord> {
    let mut pods: BTreeMap<(String, String), PodRecord> = BTreeMap::new();
    for container in containers {
        let pod = pods
            .entry((container.namespace.clone(), container.pod.clone()))
            .or_insert_with(|| PodRecord::new(&container.namespace, &container.pod));
        pod.containers.push(container);
    }

    pods.into_values()
        .map(|mut pod| {
            recompute_totals(&mut pod, false);
            pod
        })
        .collect()
}

/// Rebuild the pod-level totals from its containers; optimized usage is
/// only summed after a rightsizing pass.
pub fn recompute_totals(pod: &mut PodRecord, include_optimized: bool) {
    for usage in pod.usages.values_mut() {
        *usage = ResourceUsage::new(&usage.resource_name);
    }
    for container in &pod.containers {
        for (resource, usage) in &container.usages {
            pod.usages
                .entry(resource.clone())
                .or_insert_with(|| ResourceUsage::new(resource))
                .accumulate(usage, include_optimized);
        }
    }
}
