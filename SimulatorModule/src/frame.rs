//! # Frame Export
//!
//! Turns the simulator's handle-based change log into the id-based property
//! changes of a UIDiff.

use log::warn;

use rigsync_shared::{LoggedChange, ObjectHandle, PropertyChange, PropertyValue, SceneRegistry, NULL_OBJECT_ID};

/// Swap the local handle reference nested in a value for its canonical id
pub fn export_value(value: &PropertyValue, registry: &SceneRegistry) -> PropertyValue {
    match value.object_ref() {
        Some(raw) => {
            let id = ObjectHandle::from_raw(raw)
                .and_then(|handle| registry.id_of(&handle))
                .unwrap_or_else(|| {
                    warn!("Property value references an unregistered object");
                    NULL_OBJECT_ID
                });
            value.with_object_ref(id)
        }
        None => value.clone(),
    }
}

/// Convert a drained change log into wire changes.
///
/// A change to an object that isn't registered is kept with the null id so
/// the operation sequence cursors still line up; receivers report it as
/// unresolved.
pub fn export_changes(changes: Vec<LoggedChange>, registry: &SceneRegistry) -> Vec<PropertyChange> {
    changes
        .into_iter()
        .map(|change| {
            let object_id = registry.id_of(&change.object).unwrap_or_else(|| {
                warn!(
                    "Property {} changed on unregistered object {:?}",
                    change.property_id, change.object
                );
                NULL_OBJECT_ID
            });

            PropertyChange {
                object_id,
                property_id: change.property_id,
                value: export_value(&change.value, registry),
            }
        })
        .collect()
}
