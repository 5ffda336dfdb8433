//! The pluggable map from symbolic type names to opaque integer ids.
//!
//! Hosts share one map between all loaded node factories so the ids a node
//! emits in its parameter protocol mean the same thing everywhere. Id 0 is
//! reserved as "no type".

use std::sync::Mutex;

use fnv::FnvHashMap;

/// Symbolic names of the types this crate registers.
pub mod names {
    pub const INTERFACE_NODE: &str = "Interface:Node";

    pub const MEDIA_AUDIO: &str = "Media:Audio";
    pub const MEDIA_VIDEO: &str = "Media:Video";
    pub const MEDIA_SUBKIND_RAW: &str = "MediaSubkind:Raw";

    pub const COMMAND_START: &str = "Command:Start";
    pub const COMMAND_PAUSE: &str = "Command:Pause";

    pub const PARAM_LIST: &str = "Param:List";
    pub const PARAM_ENUM_FORMAT: &str = "Param:EnumFormat";
    pub const PARAM_FORMAT: &str = "Param:Format";
    pub const PARAM_BUFFERS: &str = "Param:Buffers";
    pub const PARAM_META: &str = "Param:Meta";
    pub const PARAM_IO_BUFFERS: &str = "Param:IoBuffers";

    pub const META_HEADER: &str = "Meta:Header";
}

/// Resolves symbolic constants to stable opaque ids.
pub trait TypeMap: Send + Sync {
    /// The id for `name`, interning it on first use. Never returns 0.
    fn id_of(&self, name: &str) -> u32;

    /// The name previously interned under `id`, if any.
    fn name_of(&self, id: u32) -> Option<String>;
}

/// An in-process `TypeMap` backed by an intern table.
pub struct LocalTypeMap {
    inner: Mutex<LocalTypeMapInner>,
}

struct LocalTypeMapInner {
    ids: FnvHashMap<String, u32>,
    names: Vec<String>,
}

impl LocalTypeMap {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LocalTypeMapInner { ids: FnvHashMap::default(), names: Vec::new() }),
        }
    }
}

impl Default for LocalTypeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeMap for LocalTypeMap {
    fn id_of(&self, name: &str) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = inner.ids.get(name) {
            return *id;
        }
        inner.names.push(name.to_string());
        // Ids start at 1; 0 stays "no type".
        let id = inner.names.len() as u32;
        inner.ids.insert(name.to_string(), id);
        id
    }

    fn name_of(&self, id: u32) -> Option<String> {
        if id == 0 {
            return None;
        }
        let inner = self.inner.lock().unwrap();
        inner.names.get((id - 1) as usize).cloned()
    }
}

/// The ids a handle needs at runtime, resolved once at init.
#[derive(Debug, Clone, Copy)]
pub struct TypeIds {
    pub node: u32,

    pub media_audio: u32,
    pub media_subkind_raw: u32,

    pub command_start: u32,
    pub command_pause: u32,

    pub param_list: u32,
    pub param_enum_format: u32,
    pub param_format: u32,
    pub param_buffers: u32,
    pub param_meta: u32,
    pub param_io_buffers: u32,

    pub meta_header: u32,
}

impl TypeIds {
    pub fn resolve(map: &dyn TypeMap) -> Self {
        Self {
            node: map.id_of(names::INTERFACE_NODE),
            media_audio: map.id_of(names::MEDIA_AUDIO),
            media_subkind_raw: map.id_of(names::MEDIA_SUBKIND_RAW),
            command_start: map.id_of(names::COMMAND_START),
            command_pause: map.id_of(names::COMMAND_PAUSE),
            param_list: map.id_of(names::PARAM_LIST),
            param_enum_format: map.id_of(names::PARAM_ENUM_FORMAT),
            param_format: map.id_of(names::PARAM_FORMAT),
            param_buffers: map.id_of(names::PARAM_BUFFERS),
            param_meta: map.id_of(names::PARAM_META),
            param_io_buffers: map.id_of(names::PARAM_IO_BUFFERS),
            meta_header: map.id_of(names::META_HEADER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let map = LocalTypeMap::new();
        let a = map.id_of("Media:Audio");
        let b = map.id_of("Media:Video");
        assert_ne!(a, 0);
        assert_ne!(a, b);
        assert_eq!(map.id_of("Media:Audio"), a);
        assert_eq!(map.name_of(a).as_deref(), Some("Media:Audio"));
        assert_eq!(map.name_of(0), None);
        assert_eq!(map.name_of(999), None);
    }

    #[test]
    fn resolve_covers_distinct_ids() {
        let map = LocalTypeMap::new();
        let ids = TypeIds::resolve(&map);
        let all = [
            ids.node,
            ids.media_audio,
            ids.media_subkind_raw,
            ids.command_start,
            ids.command_pause,
            ids.param_list,
            ids.param_enum_format,
            ids.param_format,
            ids.param_buffers,
            ids.param_meta,
            ids.param_io_buffers,
            ids.meta_header,
        ];
        for (i, a) in all.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
