//! Flattening of resource → scope → record trees into leaf records.

use serde::{Deserialize, Serialize};
use sigflat_common::{Attributes, Batch, SignalRecord};

/// Context attached to each flattened record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enrichment {
    /// Pass records through unchanged.
    #[default]
    None,
    /// Attach the owning resource's attributes as a `resource` object.
    ResourceAttributes,
}

/// A leaf record, optionally paired with inherited resource context.
///
/// Serializes as the leaf's own fields, plus a `resource` object when
/// enrichment is enabled.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FlattenedRecord<'a, L> {
    #[serde(flatten)]
    pub record: L,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<&'a Attributes>,
}

/// Walks a batch and yields its leaf records in tree order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFlattener {
    enrichment: Enrichment,
}

impl RecordFlattener {
    pub fn new(enrichment: Enrichment) -> Self {
        Self { enrichment }
    }

    pub fn enrichment(&self) -> Enrichment {
        self.enrichment
    }

    /// Flatten a batch.
    ///
    /// Resources are visited in order, then scopes within each resource, then
    /// records within each scope, then the leaves of each record. Nothing is
    /// reordered or deduplicated, and the batch is only read.
    pub fn flatten<'a, T>(
        &self,
        batch: &'a Batch<T>,
    ) -> impl Iterator<Item = FlattenedRecord<'a, T::Leaf<'a>>> + use<'a, T>
    where
        T: SignalRecord,
    {
        let enrichment = self.enrichment;

        batch.resources.iter().flat_map(move |group| {
            let resource = match enrichment {
                Enrichment::None => None,
                Enrichment::ResourceAttributes => Some(&group.resource.attributes),
            };

            group
                .scopes
                .iter()
                .flat_map(|scope| scope.records.iter())
                .flat_map(|record| record.leaves())
                .map(move |leaf| FlattenedRecord {
                    record: leaf,
                    resource,
                })
        })
    }
}
