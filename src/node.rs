use std::sync::Arc;

use bitflags::bitflags;

use crate::buffer::SharedBuffer;
use crate::error::NodeError;
use crate::io::{IoStatus, SharedIo};
use crate::param::{IoKind, Param, ParamKind};

/// Which side of a node a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::Input => Direction::Output,
            Direction::Output => Direction::Input,
        }
    }
}

/// Commands a scheduler can send to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Suspend,
    Flush,
    Drain,
}

/// Current and maximum port counts per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCounts {
    pub n_inputs: u32,
    pub max_inputs: u32,
    pub n_outputs: u32,
    pub max_outputs: u32,
}

bitflags! {
    /// Capabilities a port advertises to the scheduler.
    pub struct PortFlags: u32 {
        /// The port accepts externally allocated buffers through
        /// `port_use_buffers`.
        const CAN_USE_BUFFERS = 1 << 0;
        /// The port can allocate buffer memory itself.
        const CAN_ALLOC_BUFFERS = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PortInfo {
    pub flags: PortFlags,
}

/// Notifications a node can deliver back to its scheduler.
///
/// A data-transforming node driven purely by `process` ticks may never
/// emit any of these; the scheduler still registers a set so graph-driving
/// nodes share one surface.
pub trait NodeCallbacks: Send + Sync {
    /// The node has I/O ready outside of a process tick.
    fn ready(&self, _status: IoStatus) {}

    /// The node is done with an input buffer and hands it back.
    fn reuse_buffer(&self, _port_id: u32, _buffer_id: u32) {}
}

/// The scheduler-facing interface of a graph node.
///
/// All mutating calls must be serialised with `process` by the caller;
/// the standard pattern is to hold the hosting loop's lock around each of
/// them (see `ThreadLoop`).
pub trait Node {
    /// Handle a control command. Only `Start` and `Pause` are accepted by
    /// data-transforming nodes.
    fn send_command(&mut self, command: Command) -> Result<(), NodeError>;

    /// Store the scheduler's callback set. Replaces any previous set.
    fn set_callbacks(&mut self, callbacks: Arc<dyn NodeCallbacks>);

    /// Enumerate node-level parameters. Nodes without any refuse with
    /// `Unsupported`.
    fn enum_params(&self, kind: ParamKind, index: u32) -> Result<Option<Param>, NodeError>;

    /// Set a node-level parameter. Nodes without any refuse with
    /// `Unsupported`.
    fn set_param(&mut self, kind: ParamKind, param: Option<&Param>) -> Result<(), NodeError>;

    fn n_ports(&self) -> PortCounts;

    /// The ids of the ports in `direction`.
    fn port_ids(&self, direction: Direction) -> &[u32];

    fn add_port(&mut self, direction: Direction, port_id: u32) -> Result<(), NodeError>;

    fn remove_port(&mut self, direction: Direction, port_id: u32) -> Result<(), NodeError>;

    fn port_info(&self, direction: Direction, port_id: u32) -> Result<PortInfo, NodeError>;

    /// Enumerate parameter objects of `kind`, one per `index` starting at
    /// 0. `Ok(None)` marks the end of the sequence.
    fn port_enum_params(
        &self,
        direction: Direction,
        port_id: u32,
        kind: ParamKind,
        index: u32,
    ) -> Result<Option<Param>, NodeError>;

    /// Set (`Some`) or clear (`None`) a parameter on a port. Only
    /// `ParamKind::Format` is settable on this node.
    fn port_set_param(
        &mut self,
        direction: Direction,
        port_id: u32,
        kind: ParamKind,
        param: Option<&Param>,
    ) -> Result<(), NodeError>;

    /// Register the given buffers on a port, replacing any previous set.
    /// An empty slice just clears the port.
    fn port_use_buffers(
        &mut self,
        direction: Direction,
        port_id: u32,
        buffers: &[SharedBuffer],
    ) -> Result<(), NodeError>;

    /// Ask the port to allocate its own buffers. Data transformers refuse.
    fn port_alloc_buffers(
        &mut self,
        direction: Direction,
        port_id: u32,
        n_buffers: u32,
    ) -> Result<Vec<SharedBuffer>, NodeError>;

    /// Bind (`Some`) or unbind (`None`) a shared I/O area on a port.
    fn port_set_io(
        &mut self,
        direction: Direction,
        port_id: u32,
        kind: IoKind,
        io: Option<SharedIo>,
    ) -> Result<(), NodeError>;

    /// Hand a consumed output buffer back to the port's free queue.
    /// A buffer that is already free is left alone.
    fn port_reuse_buffer(&mut self, port_id: u32, buffer_id: u32) -> Result<(), NodeError>;

    fn port_send_command(
        &mut self,
        direction: Direction,
        port_id: u32,
        command: Command,
    ) -> Result<(), NodeError>;

    /// One scheduling tick: move at most one buffer from the input slot
    /// through the conversion chain into the output slot.
    ///
    /// Must not block and must not call scheduler callbacks.
    fn process(&mut self) -> Result<IoStatus, NodeError>;
}
