use std::ptr::NonNull;
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use bitflags::bitflags;
use smallvec::SmallVec;

// ----- SAFETY NOTE --------------------------------------------------------
//
// Buffer payloads are owned by the scheduler, not by this crate: a
// `DataPlane` carries a raw pointer into memory the scheduler allocated
// (heap, memfd or dmabuf mapping). The node never allocates or frees
// payloads, it only reads and writes through `data`.
//
// Why this is sound:
//
// - Raw plane access is confined to `DataPlane::bytes`/`bytes_mut` in this
//   file; everything else in the crate goes through those two methods.
// - Registration is bracketed: planes are only dereferenced between
//   `port_use_buffers` and the matching `clear_buffers` (format clear or
//   teardown), and the scheduler keeps the payloads mapped for exactly
//   that window.
// - The scheduling model is single-threaded cooperative: the thread that
//   calls `process` is the only one touching plane contents, and the
//   free-queue/in-flight state machine guarantees a buffer is never both
//   read and written in the same tick.
//
// --------------------------------------------------------------------------

bitflags! {
    /// Per-buffer state bits.
    pub struct BufferFlags: u32 {
        /// The buffer is in flight: handed to the consumer, off the free
        /// queue.
        const OUT_WITH_CONSUMER = 1 << 0;
    }
}

/// The kind of memory backing a data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    MemPtr,
    MemFd,
    DmaBuf,
}

/// One plane of payload memory inside a buffer.
#[derive(Debug, Clone, Copy)]
pub struct DataPlane {
    pub kind: DataKind,
    /// Base of the scheduler-owned payload. See the safety note above.
    pub data: *mut u8,
    /// Capacity of the payload in bytes.
    pub max_size: u32,
    /// Bytes currently valid, written by whoever produced the plane.
    pub size: u32,
}

impl DataPlane {
    /// The valid bytes of this plane.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        // See the safety note at the top of this file.
        unsafe { std::slice::from_raw_parts(self.data, self.size as usize) }
    }

    /// The full capacity of this plane, for writing.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // See the safety note at the top of this file.
        unsafe { std::slice::from_raw_parts_mut(self.data, self.max_size as usize) }
    }
}

/// A standard metadata block optionally attached to a buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaHeader {
    pub flags: u32,
    pub seq: u32,
    pub pts: i64,
    pub dts_offset: i64,
}

/// A buffer handle as registered by the scheduler.
///
/// The node tracks it by `id`; the payload planes stay scheduler-owned.
#[derive(Debug)]
pub struct HostBuffer {
    pub id: u32,
    pub planes: SmallVec<[DataPlane; 2]>,
    /// Header metadata located by the scheduler, if the buffer carries one.
    pub header: Option<NonNull<MediaHeader>>,
}

impl HostBuffer {
    pub fn new(id: u32, planes: SmallVec<[DataPlane; 2]>) -> Self {
        Self { id, planes, header: None }
    }
}

// The raw plane pointers reference scheduler-owned mappings that are kept
// alive and unaliased for the registration window (see the safety note).
// Cross-thread access always goes through the `AtomicRefCell` of a
// `SharedBuffer`, which serialises borrows.
unsafe impl Send for HostBuffer {}
unsafe impl Sync for HostBuffer {}

/// A buffer shared between the scheduler and a node.
pub type SharedBuffer = Arc<AtomicRefCell<HostBuffer>>;
