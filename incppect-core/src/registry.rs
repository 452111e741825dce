//! Variable registry: path templates mapped to getter functions.
//!
//! A path is an opaque string such as `"imgui.texture_data[%d]"`. Every `%d`
//! is an integer wildcard whose value the client supplies when it subscribes.
//! Paths are resolved to a [`GetterId`] once, at subscribe time; the update
//! loop only ever calls getters by id.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use crate::error::IncppectError;
use crate::session::{ClientId, ServerStats};

/// Stable index of a registered getter.
pub type GetterId = usize;

/// Marker counted to find a path's wildcard arity.
pub const WILDCARD: &str = "%d";

/// Produces the current bytes of one variable.
pub type Getter<S> = Box<dyn Fn(&GetterCtx<'_, S>) -> Bytes + Send>;

// ── GetterCtx ────────────────────────────────────────────────────

/// Everything a getter may look at while producing its payload.
pub struct GetterCtx<'a, S> {
    /// Application state handed to the update pass.
    pub state: &'a S,
    /// Wildcard indices of the request being served.
    pub idxs: &'a [i32],
    /// The client the payload is for.
    pub client_id: ClientId,
    pub stats: &'a ServerStats,
    /// Connected clients and their IPv4 bytes.
    pub clients: &'a BTreeMap<ClientId, [u8; 4]>,
}

impl<S> GetterCtx<'_, S> {
    /// The `n`-th wildcard index, if the request carries one.
    pub fn idx(&self, n: usize) -> Option<i32> {
        self.idxs.get(n).copied()
    }
}

// ── Registry ─────────────────────────────────────────────────────

struct Entry<S> {
    path: String,
    arity: usize,
    getter: Getter<S>,
}

/// Path template to getter map, owned by one server instance.
pub struct Registry<S> {
    by_path: HashMap<String, GetterId>,
    entries: Vec<Entry<S>>,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            by_path: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new path. A path can be registered only once.
    pub fn register<F>(&mut self, path: impl Into<String>, getter: F) -> Result<GetterId, IncppectError>
    where
        F: Fn(&GetterCtx<'_, S>) -> Bytes + Send + 'static,
    {
        let path = path.into();
        if self.by_path.contains_key(&path) {
            return Err(IncppectError::DuplicatePath(path));
        }
        Ok(self.insert(path, Box::new(getter)))
    }

    /// Register `path`, swapping the getter in place if it already exists.
    ///
    /// Live requests keep their [`GetterId`] and pick up the new getter on
    /// their next update.
    pub fn replace<F>(&mut self, path: impl Into<String>, getter: F) -> GetterId
    where
        F: Fn(&GetterCtx<'_, S>) -> Bytes + Send + 'static,
    {
        let path = path.into();
        match self.by_path.get(&path) {
            Some(&id) => {
                self.entries[id].getter = Box::new(getter);
                id
            }
            None => self.insert(path, Box::new(getter)),
        }
    }

    pub fn resolve(&self, path: &str) -> Option<GetterId> {
        self.by_path.get(path).copied()
    }

    /// Number of `%d` wildcards in the getter's path.
    pub fn arity(&self, id: GetterId) -> Option<usize> {
        self.entries.get(id).map(|e| e.arity)
    }

    pub fn path(&self, id: GetterId) -> Option<&str> {
        self.entries.get(id).map(|e| e.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run a getter. Unknown ids yield an empty payload.
    pub fn call(&self, id: GetterId, ctx: &GetterCtx<'_, S>) -> Bytes {
        match self.entries.get(id) {
            Some(entry) => (entry.getter)(ctx),
            None => Bytes::new(),
        }
    }

    fn insert(&mut self, path: String, getter: Getter<S>) -> GetterId {
        let id = self.entries.len();
        let arity = path.matches(WILDCARD).count();
        self.by_path.insert(path.clone(), id);
        self.entries.push(Entry { path, arity, getter });
        id
    }
}

// ── Payload helpers ──────────────────────────────────────────────

/// Little-endian payload helpers for getters.
pub mod view {
    use bytes::{BufMut, Bytes, BytesMut};

    pub fn i32(v: i32) -> Bytes {
        Bytes::copy_from_slice(&v.to_le_bytes())
    }

    pub fn u32(v: u32) -> Bytes {
        Bytes::copy_from_slice(&v.to_le_bytes())
    }

    pub fn u64(v: u64) -> Bytes {
        Bytes::copy_from_slice(&v.to_le_bytes())
    }

    pub fn f32s(values: &[f32]) -> Bytes {
        let mut out = BytesMut::with_capacity(values.len() * 4);
        for v in values {
            out.put_f32_le(*v);
        }
        out.freeze()
    }

    pub fn str(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }
}
