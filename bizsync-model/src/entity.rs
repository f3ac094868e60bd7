use crate::FieldMerger;
use bizsync_types::EntityId;
use serde::Serialize;

/// A business entity whose fields are CRDT values.
///
/// The entity as a whole carries no clock of its own: merging two versions
/// is the field-by-field merge performed in [`MergeableEntity::merge_with`].
/// Implementations should route every field through `merger` so the
/// resolver can classify the result.
pub trait MergeableEntity: Clone + Serialize {
    /// Identity shared by every version of the entity.
    fn entity_id(&self) -> EntityId;

    /// Type name used in conflict records (for example `"invoice"`).
    fn entity_type(&self) -> &str;

    /// Returns the merge of this version with `remote`.
    fn merge_with(&self, remote: &Self, merger: &mut FieldMerger) -> Self;
}
