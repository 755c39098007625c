//! Asset cache
//!
//! Bounded LRU cache mapping a resource identifier to its loaded template
//! entity, so repeated steps do not reload the same 3D model. Entries are
//! shared read-only across overlay instances; instances clone the entity
//! before applying per-instance color or scale. Reads are concurrent at
//! the call-site level; insertion and eviction are serialized under the
//! internal mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chefar_common::Result;
use tracing::debug;

use crate::scene::{EntityHandle, SceneRenderer};

struct CacheInner {
    map: HashMap<String, EntityHandle>,
    /// Recency order, least-recently-used at the front.
    order: VecDeque<String>,
}

/// Bounded LRU cache over loaded renderable entities.
pub struct AssetCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl AssetCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Look up `asset_id`, loading through the renderer on a miss.
    ///
    /// Load failures propagate; the caller decides on placeholder
    /// degradation. Inserting past capacity evicts the least-recently-used
    /// entry.
    pub fn get_or_load<R: SceneRenderer + ?Sized>(
        &self,
        asset_id: &str,
        renderer: &R,
    ) -> Result<EntityHandle> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(&entity) = inner.map.get(asset_id) {
                Self::touch(&mut inner.order, asset_id);
                return Ok(entity);
            }
        }

        // Load outside the lock; the coordinator is the only writer in
        // practice, so a racing double-load at worst wastes one load.
        let entity = renderer.load_entity(asset_id)?;

        let mut inner = self.inner.lock().unwrap();
        if inner.map.insert(asset_id.to_string(), entity).is_none() {
            inner.order.push_back(asset_id.to_string());
        } else {
            Self::touch(&mut inner.order, asset_id);
        }
        while inner.map.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
                debug!(asset_id = %evicted, "Evicted least-recently-used asset");
            } else {
                break;
            }
        }
        Ok(entity)
    }

    /// Whether `asset_id` is currently resident (does not touch recency).
    pub fn contains(&self, asset_id: &str) -> bool {
        self.inner.lock().unwrap().map.contains_key(asset_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(order: &mut VecDeque<String>, asset_id: &str) {
        if let Some(pos) = order.iter().position(|id| id == asset_id) {
            order.remove(pos);
        }
        order.push_back(asset_id.to_string());
    }
}
