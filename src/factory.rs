//! The plug-in entry point through which a host instantiates nodes.
//!
//! A factory describes what it can build; `init` resolves the host
//! supports and returns a handle whose interfaces are looked up by the
//! opaque ids of the shared type map.

use std::sync::Arc;

use crate::convert::{ConvertNode, DspKernels};
use crate::error::NodeError;
use crate::node::Node;
use crate::type_map::{TypeIds, TypeMap};

/// Ambient facilities a host offers to factories at init time.
pub struct SupportSet {
    /// The shared symbolic-name map. Mandatory.
    pub type_map: Option<Arc<dyn TypeMap>>,
    /// Remix/resample kernels for nodes that transform channel counts or
    /// rates. Optional; without them only pack/unpack chains plan.
    pub dsp: Option<DspKernels>,
}

impl SupportSet {
    pub fn new(type_map: Arc<dyn TypeMap>) -> Self {
        Self { type_map: Some(type_map), dsp: None }
    }

    pub fn with_dsp(mut self, dsp: DspKernels) -> Self {
        self.dsp = Some(dsp);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InterfaceInfo {
    pub name: &'static str,
}

/// An instantiated plug-in object; interfaces are fetched by type id.
pub trait Handle {
    fn interface(&mut self, interface_id: u32) -> Result<&mut dyn Node, NodeError>;
}

/// A named constructor for plug-in handles.
pub trait HandleFactory {
    fn name(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Extra information about this factory, as key/value pairs.
    fn properties(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn init(&self, support: &SupportSet) -> Result<Box<dyn Handle>, NodeError>;

    /// Enumerate the interfaces handles built by this factory expose.
    /// `None` marks the end of the sequence.
    fn enum_interface_info(&self, index: u32) -> Option<InterfaceInfo>;
}

static CONVERT_INTERFACES: &[InterfaceInfo] = &[InterfaceInfo { name: "Node" }];

/// Factory for the format conversion node.
pub struct ConvertFactory;

pub const CONVERT_FACTORY_NAME: &str = "fmtconvert";

impl HandleFactory for ConvertFactory {
    fn name(&self) -> &'static str {
        CONVERT_FACTORY_NAME
    }

    fn version(&self) -> u32 {
        0
    }

    fn init(&self, support: &SupportSet) -> Result<Box<dyn Handle>, NodeError> {
        let map = match &support.type_map {
            Some(map) => map,
            None => {
                log::error!("{}: an id map is needed", CONVERT_FACTORY_NAME);
                return Err(NodeError::Invalid);
            }
        };

        let types = TypeIds::resolve(map.as_ref());

        Ok(Box::new(ConvertHandle { types, node: ConvertNode::with_dsp(support.dsp) }))
    }

    fn enum_interface_info(&self, index: u32) -> Option<InterfaceInfo> {
        CONVERT_INTERFACES.get(index as usize).copied()
    }
}

/// Handle wrapping one `ConvertNode`.
pub struct ConvertHandle {
    types: TypeIds,
    node: ConvertNode,
}

impl ConvertHandle {
    pub fn node(&mut self) -> &mut ConvertNode {
        &mut self.node
    }
}

impl Handle for ConvertHandle {
    fn interface(&mut self, interface_id: u32) -> Result<&mut dyn Node, NodeError> {
        if interface_id == self.types.node {
            Ok(&mut self.node)
        } else {
            Err(NodeError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_map::{names, LocalTypeMap};

    #[test]
    fn init_needs_a_type_map() {
        let factory = ConvertFactory;
        let support = SupportSet { type_map: None, dsp: None };
        assert!(matches!(factory.init(&support), Err(NodeError::Invalid)));
    }

    #[test]
    fn interface_dispatch() {
        let factory = ConvertFactory;
        let map: Arc<dyn TypeMap> = Arc::new(LocalTypeMap::new());
        let node_id = map.id_of(names::INTERFACE_NODE);

        let mut handle = factory.init(&SupportSet::new(Arc::clone(&map))).unwrap();
        assert!(handle.interface(node_id).is_ok());
        assert!(matches!(handle.interface(node_id + 1000), Err(NodeError::NotFound)));
    }

    #[test]
    fn advertises_one_node_interface() {
        let factory = ConvertFactory;
        assert_eq!(factory.enum_interface_info(0).map(|i| i.name), Some("Node"));
        assert!(factory.enum_interface_info(1).is_none());
    }
}
