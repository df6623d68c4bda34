//! Entities that carry a resource -> usage map
//!
//! Containers and vms differ only in how a stored series identity maps to
//! an entity; merging series and quota is shared.

use crate::models::{container_key, ContainerRecord, ResourceUsage, VmRecord};
use crate::source::{MetricSeries, QuotaKind, QuotaRow, SeriesIdentity};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// An entity owning one usage record per resource
pub trait ResourceEntity: Clone + Send + Sync + 'static {
    /// Kind name used in error messages (`container`, `vm`)
    const KIND: &'static str;

    fn from_identity(identity: &SeriesIdentity) -> Self;

    fn identity_key(identity: &SeriesIdentity) -> String;

    fn usages(&self) -> &BTreeMap<String, ResourceUsage>;

    fn usages_mut(&mut self) -> &mut BTreeMap<String, ResourceUsage>;
}

impl ResourceEntity for ContainerRecord {
    const KIND: &'static str = "container";

    fn from_identity(identity: &SeriesIdentity) -> Self {
        ContainerRecord::new(&identity.namespace, &identity.owner, &identity.container)
    }

    fn identity_key(identity: &SeriesIdentity) -> String {
        container_key(&identity.namespace, &identity.owner, &identity.container)
    }

    fn usages(&self) -> &BTreeMap<String, ResourceUsage> {
        &self.usages
    }

    fn usages_mut(&mut self) -> &mut BTreeMap<String, ResourceUsage> {
        &mut self.usages
    }
}

impl ResourceEntity for VmRecord {
    const KIND: &'static str = "vm";

    fn from_identity(identity: &SeriesIdentity) -> Self {
        VmRecord::new(&identity.owner)
    }

    fn identity_key(identity: &SeriesIdentity) -> String {
        identity.owner.clone()
    }

    fn usages(&self) -> &BTreeMap<String, ResourceUsage> {
        &self.usages
    }

    fn usages_mut(&mut self) -> &mut BTreeMap<String, ResourceUsage> {
        &mut self.usages
    }
}

/// Entities built from one aggregation call, keyed by identity key.
///
/// Upserts are keyed, so the result does not depend on the order in which
/// concurrent sub-queries complete.
#[derive(Debug, Clone)]
pub struct EntitySet<E> {
    entities: BTreeMap<String, E>,
    /// (entity key, resource) -> series id that produced the record
    sources: HashMap<(String, String), i64>,
    /// Keys seen with more than one distinct stored series for a resource
    duplicates: BTreeSet<String>,
}

impl<E> Default for EntitySet<E> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
            sources: HashMap::new(),
            duplicates: BTreeSet::new(),
        }
    }
}

impl<E: ResourceEntity> EntitySet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the usage record of every series under `resource`
    pub fn merge_series(&mut self, resource: &str, series: Vec<MetricSeries>) {
        for s in series {
            let key = E::identity_key(&s.identity);
            let source = (key.clone(), resource.to_string());
            match self.sources.get(&source) {
                Some(id) if *id != s.identity.series_id => {
                    self.duplicates.insert(key.clone());
                }
                _ => {
                    self.sources.insert(source, s.identity.series_id);
                }
            }

            let entity = self
                .entities
                .entry(key)
                .or_insert_with(|| E::from_identity(&s.identity));
            entity
                .usages_mut()
                .entry(resource.to_string())
                .or_insert_with(|| ResourceUsage::new(resource))
                .set_series(s.points);
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// True when some stored name resolved to more than one series
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&E> {
        self.entities.get(key)
    }

    pub fn into_vec(self) -> Vec<E> {
        self.entities.into_values().collect()
    }
}

impl EntitySet<ContainerRecord> {
    /// Overlay declared quota, creating container and resource records the
    /// metric queries did not produce
    pub fn merge_quota(&mut self, kind: QuotaKind, rows: Vec<QuotaRow>) {
        for row in rows {
            let key = container_key(&row.namespace, &row.pod, &row.container);
            let container = self
                .entities
                .entry(key)
                .or_insert_with(|| ContainerRecord::new(&row.namespace, &row.pod, &row.container));
            let usage = container
                .usages
                .entry(row.resource.clone())
                .or_insert_with(|| ResourceUsage::new(&row.resource));
            match kind {
                QuotaKind::Request => usage.request = row.value,
                QuotaKind::Limit => usage.limit = row.value,
            }
        }
    }
}
