//! # SharedModule
//!
//! Shared types and machinery used by the frontend, simulator and slave
//! roles of rigsync: object ids and the registry that maps them to local
//! handles, the scene container, the operation log with its apply/map
//! dispatch, the per-frame property change log and operation queue, the
//! deferred garbage collector, protocol messages and the streams that carry
//! them.

// Export module structure
pub mod types;
pub mod property;
pub mod object;
pub mod constants;
pub mod config;
pub mod context;
pub mod error;
pub mod scene;
pub mod registry;
pub mod operation;
pub mod queue;
pub mod interleave;
pub mod gc;
pub mod messages;
pub mod stream;

// Re-export commonly used items for convenience
pub use types::*;
pub use property::{PropertyChange, PropertyChangeLog, PropertyType, PropertyValue, LoggedChange};
pub use object::{ObjectHandle, ObjectKind, ObjectLifecycleState, PropertyMethod};
pub use config::{SyncConfig, Topology};
pub use error::{BatchErrors, OperationFailure, SyncError};
pub use scene::{Introspectable, ObjectData, Scene, SceneObject};
pub use registry::{IdRole, ObjectRegistry};
pub use operation::{ApplyContext, IdMap, Operation, OperationKind};
pub use queue::{OperationQueue, OperationRecord};
pub use interleave::{interleave, ReplayStep};
pub use gc::GarbageCollector;
pub use messages::*;
pub use stream::Stream;

/// Registry of local scene handles
pub type SceneRegistry = ObjectRegistry<ObjectHandle>;
