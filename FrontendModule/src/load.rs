//! # UI Loading
//!
//! Loads a UI description into the frontend's scene under fresh temporary
//! ids. The same operations, now carrying those temporary ids, are what gets
//! sent to the simulator; its LoadResult later says which canonical id each
//! temporary id became.

use std::collections::HashMap;
use log::{debug, info};

use rigsync_shared::error::OperationFailure;
use rigsync_shared::messages::UiDescription;
use rigsync_shared::operation::{ApplyContext, IdMap};
use rigsync_shared::{
    BatchErrors, GarbageCollector, ObjectHandle, ObjectId, Scene, SceneRegistry, SyncError,
};

/// Maps a description's own ids onto temporary ids of the loading registry
struct LoadIdMap<'a> {
    ids: &'a mut HashMap<ObjectId, ObjectId>,
    registry: &'a mut SceneRegistry,
}

impl<'a> IdMap for LoadIdMap<'a> {
    fn map_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        self.ids.get(&id).copied().ok_or(SyncError::UnresolvedId(id))
    }

    fn map_new_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        if self.ids.contains_key(&id) {
            return Err(SyncError::DuplicateRegistration { id });
        }
        let temporary = self.registry.reserve_temporary_id()?;
        self.ids.insert(id, temporary);
        Ok(temporary)
    }
}

/// Outcome of loading a description locally
#[derive(Debug, Default)]
pub struct LoadedUi {
    /// The operations that applied, in temporary ids, ready for the simulator
    pub outbound: UiDescription,

    /// Local object for each id used by the description
    pub objects: HashMap<ObjectId, ObjectHandle>,

    pub errors: BatchErrors,
}

/// Replace the scene with `ui`, best effort.
///
/// The scene, registry and collector are reset first. Ids in `ui` are
/// private to the description; any id space works.
pub fn load_description(
    ui: &UiDescription,
    scene: &mut Scene,
    registry: &mut SceneRegistry,
    gc: &mut GarbageCollector<ObjectHandle>,
) -> LoadedUi {
    scene.clear();
    registry.clear();
    gc.clear();

    let mut ids = HashMap::new();
    let mut loaded = LoadedUi::default();

    for (index, op) in ui.ops.iter().enumerate() {
        let mapped = {
            let mut mapper = LoadIdMap { ids: &mut ids, registry: &mut *registry };
            op.mapped(&mut mapper)
        };
        let result = mapped.and_then(|mapped| {
            let mut ctx = ApplyContext::new(&mut *scene, &mut *registry, &mut *gc);
            mapped.apply(&mut ctx)?;
            Ok(mapped)
        });

        match result {
            Ok(mapped) => loaded.outbound.ops.push(mapped),
            Err(error) => {
                debug!("Load operation #{} ({}) failed: {}", index, op.kind(), error);
                loaded.errors.push(OperationFailure {
                    index,
                    kind: op.kind().as_str(),
                    error,
                    backtrace: None,
                });
            }
        }
    }

    loaded.objects = ids
        .into_iter()
        .filter_map(|(id, temporary)| registry.lookup(temporary).map(|handle| (id, handle)))
        .collect();

    info!(
        "Loaded {} of {} operation(s), {} object(s)",
        loaded.outbound.ops.len(),
        ui.ops.len(),
        loaded.objects.len()
    );
    loaded
}
