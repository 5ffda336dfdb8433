//! The shared I/O slot through which a scheduler and a node hand buffers
//! to each other without function calls in the hot path.

use std::sync::Arc;

use atomic_refcell::AtomicRefCell;

/// Marks a `buffer_id` slot field as carrying no buffer.
pub const ID_INVALID: u32 = u32::MAX;

/// Non-error states of an I/O slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    Ok,
    /// The writer side wants a (new) buffer.
    NeedBuffer,
    /// A buffer id is present and waiting to be consumed.
    HaveBuffer,
}

impl IoStatus {
    pub fn raw(&self) -> i32 {
        match self {
            IoStatus::Ok => 0,
            IoStatus::NeedBuffer => 1,
            IoStatus::HaveBuffer => 2,
        }
    }

    /// Decode a non-negative wire status. Negative values are error codes
    /// and have no `IoStatus` representation.
    pub fn from_raw(raw: i32) -> Option<IoStatus> {
        match raw {
            0 => Some(IoStatus::Ok),
            1 => Some(IoStatus::NeedBuffer),
            2 => Some(IoStatus::HaveBuffer),
            _ => None,
        }
    }
}

/// The buffer-handoff slot shared between a scheduler and one port.
///
/// The layout is part of the ABI: schedulers may place this record in
/// shared memory. `status` holds an `IoStatus` raw value or a negative
/// result code. Access follows the single-writer contract of the
/// cooperative scheduling model; neither side holds a borrow across a
/// suspension point.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IoBuffers {
    pub status: i32,
    pub buffer_id: u32,
    pub area: u32,
}

impl IoBuffers {
    pub fn new() -> Self {
        Self { status: IoStatus::NeedBuffer.raw(), buffer_id: ID_INVALID, area: 0 }
    }

    pub fn set_status(&mut self, status: IoStatus) {
        self.status = status.raw();
    }

    pub fn set_error(&mut self, error: crate::NodeError) {
        self.status = error.raw();
    }

    pub fn status(&self) -> Option<IoStatus> {
        IoStatus::from_raw(self.status)
    }
}

impl Default for IoBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// An I/O slot shared between the scheduler and a node port.
pub type SharedIo = Arc<AtomicRefCell<IoBuffers>>;

pub fn new_shared_io() -> SharedIo {
    Arc::new(AtomicRefCell::new(IoBuffers::new()))
}
