//! Object index and kind registry.
//!
//! An object is opened at most once per process; sessions share handles
//! through the index, so two connections syncing the same object merge
//! into one tree. The registry maps each kind tag to a constructor,
//! populated at startup - a closed set, not open-ended dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use canopy_core::{ObjectId, ObjectKind};

use crate::error::{Result, SyncError};
use crate::replicator::ReplicatedObject;

/// A shared handle to one opened object.
#[derive(Clone)]
pub struct ObjectHandle {
    /// Kind tag the object was opened under.
    pub kind: ObjectKind,
    /// The reconciliation state machine, shared across sessions.
    pub object: Arc<Mutex<dyn ReplicatedObject>>,
}

/// Constructor invoked when an object of a kind is first opened.
pub type Constructor = Box<dyn Fn(&ObjectId) -> Arc<Mutex<dyn ReplicatedObject>> + Send + Sync>;

/// Maps kind tags to handler constructors.
#[derive(Default)]
pub struct Registry {
    constructors: HashMap<ObjectKind, Constructor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for a kind.
    pub fn register(&mut self, kind: ObjectKind, constructor: Constructor) {
        self.constructors.insert(kind, constructor);
    }

    /// Whether a constructor exists for the kind.
    pub fn supports(&self, kind: ObjectKind) -> bool {
        self.constructors.contains_key(&kind)
    }
}

/// Cache of opened objects, shared by every session of a host.
pub struct ObjectIndex {
    registry: Registry,
    objects: Mutex<HashMap<ObjectId, ObjectHandle>>,
}

impl ObjectIndex {
    /// Create an index over a populated registry.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an object, constructing it lazily via the registry.
    ///
    /// Returns `None` when no constructor is registered for the kind -
    /// the session answers such binds with `Null` rather than failing
    /// the connection.
    pub fn open(&self, id: &ObjectId, kind: ObjectKind) -> Result<Option<ObjectHandle>> {
        let mut objects = self.objects.lock().map_err(|_| SyncError::Poisoned)?;
        if let Some(handle) = objects.get(id) {
            return Ok(Some(handle.clone()));
        }
        let Some(constructor) = self.registry.constructors.get(&kind) else {
            debug!(%id, ?kind, "no constructor registered; declining");
            return Ok(None);
        };
        debug!(%id, ?kind, "opening object");
        let handle = ObjectHandle {
            kind,
            object: constructor(id),
        };
        objects.insert(id.clone(), handle.clone());
        Ok(Some(handle))
    }

    /// Look up an already-open object.
    pub fn lookup(&self, id: &ObjectId) -> Result<Option<ObjectHandle>> {
        let objects = self.objects.lock().map_err(|_| SyncError::Poisoned)?;
        Ok(objects.get(id).cloned())
    }

    /// Install a pre-built handle (used for objects with external state,
    /// like the identity database).
    pub fn insert(&self, id: ObjectId, handle: ObjectHandle) -> Result<()> {
        let mut objects = self.objects.lock().map_err(|_| SyncError::Poisoned)?;
        objects.insert(id, handle);
        Ok(())
    }
}
