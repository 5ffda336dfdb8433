//! Core of a pluggable audio-graph runtime: a stream node that converts
//! raw audio between negotiated formats, and the thread-hosted event loop
//! that drives such nodes while preserving the graph's locking discipline.

mod buffer;
mod error;
mod factory;
mod format;
mod io;
mod loop_context;
mod node;
mod param;
mod port;
mod thread_loop;
mod type_map;

pub mod convert;

pub use buffer::{BufferFlags, DataKind, DataPlane, HostBuffer, MediaHeader, SharedBuffer};
pub use convert::{ConvertNode, DspKernels, Props, RemixFn, ResampleFn, StepKind};
pub use error::{LoopStartError, NodeError};
pub use factory::{
    ConvertFactory, ConvertHandle, Handle, HandleFactory, InterfaceInfo, SupportSet,
    CONVERT_FACTORY_NAME,
};
pub use format::{
    AudioFormat, MediaFormat, MediaKind, MediaSubkind, SampleFormat, SampleLayout,
};
pub use io::{new_shared_io, IoBuffers, IoStatus, SharedIo, ID_INVALID};
pub use loop_context::{LoopContext, LoopTask};
pub use node::{
    Command, Direction, Node, NodeCallbacks, PortCounts, PortFlags, PortInfo,
};
pub use param::{
    BufferRequirements, ChoiceEnum, ChoiceRange, FormatChoices, IoKind, IoRequirement, MetaKind,
    MetaRequirement, Param, ParamKind,
};
pub use port::MAX_BUFFERS;
pub use thread_loop::{LoopDispatch, LoopGuard, ThreadLoop};
pub use type_map::{names as type_names, LocalTypeMap, TypeIds, TypeMap};
