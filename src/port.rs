use std::collections::VecDeque;

use crate::buffer::{BufferFlags, SharedBuffer};
use crate::format::AudioFormat;
use crate::io::SharedIo;
use crate::node::{Direction, PortFlags, PortInfo};

/// The most buffers a port will track.
pub const MAX_BUFFERS: usize = 32;

/// A registered buffer plus the port-side state bits for it.
pub(crate) struct PortBuffer {
    pub flags: BufferFlags,
    pub shared: SharedBuffer,
}

/// One attachment point of the node: format, registered buffers, free
/// queue and the scheduler-shared I/O slot.
pub(crate) struct Port {
    pub direction: Direction,
    pub id: u32,
    pub info: PortInfo,

    pub io: Option<SharedIo>,

    pub format: Option<AudioFormat>,
    pub bytes_per_frame: u32,

    pub buffers: Vec<PortBuffer>,
    /// Ids of registered buffers that are free to be dequeued, FIFO.
    pub queue: VecDeque<u32>,
}

impl Port {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            id: 0,
            info: PortInfo { flags: PortFlags::CAN_USE_BUFFERS },
            io: None,
            format: None,
            bytes_per_frame: 0,
            buffers: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn have_format(&self) -> bool {
        self.format.is_some()
    }

    /// Drop all registered buffers and empty the free queue.
    pub fn clear_buffers(&mut self) {
        if !self.buffers.is_empty() {
            log::debug!("port {:?}/{}: clear {} buffers", self.direction, self.id, self.buffers.len());
            self.buffers.clear();
            self.queue.clear();
        }
    }

    /// Take the oldest free buffer and mark it in flight.
    pub fn dequeue(&mut self) -> Option<u32> {
        let id = self.queue.pop_front()?;
        self.buffers[id as usize].flags.insert(BufferFlags::OUT_WITH_CONSUMER);
        Some(id)
    }

    /// Return an in-flight buffer to the back of the free queue. A buffer
    /// that is already free is left alone.
    pub fn recycle(&mut self, id: u32) {
        let b = &mut self.buffers[id as usize];
        if b.flags.contains(BufferFlags::OUT_WITH_CONSUMER) {
            b.flags.remove(BufferFlags::OUT_WITH_CONSUMER);
            self.queue.push_back(id);
            log::trace!("port {:?}/{}: recycle buffer {}", self.direction, self.id, id);
        }
    }

    /// Undo a `dequeue` that never reached the consumer: the buffer goes
    /// back to the head of the queue so ordering is preserved.
    pub fn requeue_front(&mut self, id: u32) {
        let b = &mut self.buffers[id as usize];
        if b.flags.contains(BufferFlags::OUT_WITH_CONSUMER) {
            b.flags.remove(BufferFlags::OUT_WITH_CONSUMER);
            self.queue.push_front(id);
        }
    }
}
