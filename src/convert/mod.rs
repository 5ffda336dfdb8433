//! The audio format conversion node.
//!
//! One input port, one output port. Formats are negotiated per port; once
//! both sides are accepted a conversion chain is planned and every process
//! tick moves one buffer through it.

mod chain;
mod kernels;

pub use chain::{Chain, DspKernels, RemixFn, ResampleFn, StepKind};

use std::sync::Arc;

use crate::buffer::{BufferFlags, SharedBuffer};
use crate::error::NodeError;
use crate::format::{MediaFormat, MediaKind, MediaSubkind, SampleFormat, SampleLayout};
use crate::io::{IoBuffers, IoStatus, SharedIo, ID_INVALID};
use crate::node::{
    Command, Direction, Node, NodeCallbacks, PortCounts, PortInfo,
};
use crate::param::{
    BufferRequirements, ChoiceEnum, ChoiceRange, FormatChoices, IoKind, IoRequirement, MetaKind,
    MetaRequirement, Param, ParamKind,
};
use crate::port::{Port, PortBuffer, MAX_BUFFERS};

/// Formats this node can actually convert; the advertisement is the
/// intersection of the nominal raw-audio set with the kernel table.
static ADVERTISED_FORMATS: &[SampleFormat] = &[
    SampleFormat::U8,
    SampleFormat::S16,
    SampleFormat::S16Oe,
    SampleFormat::F32,
    SampleFormat::F32Oe,
];

static ADVERTISED_LAYOUTS: &[SampleLayout] =
    &[SampleLayout::Interleaved, SampleLayout::NonInterleaved];

const PARAM_LIST: [ParamKind; 5] = [
    ParamKind::EnumFormat,
    ParamKind::Format,
    ParamKind::Buffers,
    ParamKind::Meta,
    ParamKind::IoBuffers,
];

/// Node property bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Props {
    pub truncate: bool,
    pub dither: u32,
}

impl Default for Props {
    fn default() -> Self {
        Self { truncate: false, dither: 0 }
    }
}

impl Props {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A graph node converting raw audio between two negotiated formats.
pub struct ConvertNode {
    props: Props,
    callbacks: Option<Arc<dyn NodeCallbacks>>,

    in_port: Port,
    out_port: Port,

    started: bool,

    /// Planned pipeline; `None` until both ports have convertible formats.
    chain: Option<Chain>,
    dsp: Option<DspKernels>,
}

impl ConvertNode {
    pub fn new() -> Self {
        Self::with_dsp(None)
    }

    /// Build a node with remix/resample kernels installed.
    pub fn with_dsp(dsp: Option<DspKernels>) -> Self {
        Self {
            props: Props::default(),
            callbacks: None,
            in_port: Port::new(Direction::Input),
            out_port: Port::new(Direction::Output),
            started: false,
            chain: None,
            dsp,
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    /// The scheduler callbacks, once registered.
    ///
    /// Process ticks never invoke them; they exist for graph-driving
    /// hosts that attach the node to a larger runtime.
    pub fn callbacks(&self) -> Option<&Arc<dyn NodeCallbacks>> {
        self.callbacks.as_ref()
    }

    /// The planned step kinds, if a chain is currently valid.
    pub fn chain_steps(&self) -> Option<Vec<StepKind>> {
        self.chain.as_ref().map(|c| c.step_kinds())
    }

    fn check_port(&self, _direction: Direction, port_id: u32) -> Result<(), NodeError> {
        if port_id != 0 {
            return Err(NodeError::Invalid);
        }
        Ok(())
    }

    fn port(&self, direction: Direction) -> &Port {
        match direction {
            Direction::Input => &self.in_port,
            Direction::Output => &self.out_port,
        }
    }

    fn port_mut(&mut self, direction: Direction) -> &mut Port {
        match direction {
            Direction::Input => &mut self.in_port,
            Direction::Output => &mut self.out_port,
        }
    }

    /// Record or clear a port format, replanning the chain when both
    /// sides are known.
    fn set_format(
        &mut self,
        direction: Direction,
        format: Option<&MediaFormat>,
    ) -> Result<(), NodeError> {
        match format {
            None => {
                let port = self.port_mut(direction);
                if port.have_format() {
                    port.format = None;
                    port.bytes_per_frame = 0;
                    port.clear_buffers();
                }
                self.chain = None;
                Ok(())
            }
            Some(media) => {
                let audio = media.parse_audio()?;

                let port = self.port_mut(direction);
                port.format = Some(audio);
                port.bytes_per_frame = audio.bytes_per_frame();

                let res = if self.port(direction.reverse()).have_format() {
                    self.setup_convert()
                } else {
                    Ok(())
                };
                log::debug!("set format on port {:?}: {:?} ({:?})", direction, audio, res);
                res
            }
        }
    }

    fn setup_convert(&mut self) -> Result<(), NodeError> {
        let (in_format, out_format) = match (self.in_port.format, self.out_port.format) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(NodeError::IoError),
        };

        log::info!(
            "chain: {:?}/{}ch@{} -> {:?}/{}ch@{}",
            in_format.sample_format,
            in_format.channels,
            in_format.rate,
            out_format.sample_format,
            out_format.channels,
            out_format.rate
        );

        match Chain::plan(in_format, out_format, self.dsp) {
            Ok(chain) => {
                self.chain = Some(chain);
                Ok(())
            }
            Err(e) => {
                self.chain = None;
                Err(e)
            }
        }
    }
}

impl Default for ConvertNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ConvertNode {
    fn send_command(&mut self, command: Command) -> Result<(), NodeError> {
        match command {
            Command::Start => {
                self.started = true;
                Ok(())
            }
            Command::Pause => {
                self.started = false;
                Ok(())
            }
            _ => Err(NodeError::Unsupported),
        }
    }

    fn set_callbacks(&mut self, callbacks: Arc<dyn NodeCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    fn enum_params(&self, _kind: ParamKind, _index: u32) -> Result<Option<Param>, NodeError> {
        Err(NodeError::Unsupported)
    }

    fn set_param(&mut self, _kind: ParamKind, _param: Option<&Param>) -> Result<(), NodeError> {
        Err(NodeError::Unsupported)
    }

    fn n_ports(&self) -> PortCounts {
        PortCounts { n_inputs: 1, max_inputs: 1, n_outputs: 1, max_outputs: 1 }
    }

    fn port_ids(&self, _direction: Direction) -> &[u32] {
        &[0]
    }

    fn add_port(&mut self, _direction: Direction, _port_id: u32) -> Result<(), NodeError> {
        Err(NodeError::Unsupported)
    }

    fn remove_port(&mut self, _direction: Direction, _port_id: u32) -> Result<(), NodeError> {
        Err(NodeError::Unsupported)
    }

    fn port_info(&self, direction: Direction, port_id: u32) -> Result<PortInfo, NodeError> {
        self.check_port(direction, port_id)?;
        Ok(self.port(direction).info)
    }

    fn port_enum_params(
        &self,
        direction: Direction,
        port_id: u32,
        kind: ParamKind,
        index: u32,
    ) -> Result<Option<Param>, NodeError> {
        self.check_port(direction, port_id)?;
        let port = self.port(direction);

        match kind {
            ParamKind::List => {
                Ok(PARAM_LIST.get(index as usize).map(|k| Param::List(*k)))
            }
            ParamKind::EnumFormat => {
                if index > 0 {
                    return Ok(None);
                }
                let other = self.port(direction.reverse());
                let (rate, channels) = match other.format {
                    Some(f) => (ChoiceRange::fixed(f.rate), ChoiceRange::fixed(f.channels)),
                    None => (
                        ChoiceRange::new(44100, 1, i32::MAX as u32),
                        ChoiceRange::new(2, 1, i32::MAX as u32),
                    ),
                };
                Ok(Some(Param::EnumFormat(FormatChoices {
                    media: MediaKind::Audio,
                    subkind: MediaSubkind::Raw,
                    sample_format: ChoiceEnum {
                        default: SampleFormat::S16,
                        alternatives: ADVERTISED_FORMATS,
                    },
                    layout: ChoiceEnum {
                        default: SampleLayout::Interleaved,
                        alternatives: ADVERTISED_LAYOUTS,
                    },
                    rate,
                    channels,
                })))
            }
            ParamKind::Format => {
                let format = port.format.ok_or(NodeError::NotInitialized)?;
                if index > 0 {
                    return Ok(None);
                }
                Ok(Some(Param::Format(MediaFormat::audio_raw(format))))
            }
            ParamKind::Buffers => {
                if !port.have_format() {
                    return Err(NodeError::NotInitialized);
                }
                if index > 0 {
                    return Ok(None);
                }
                let bpf = port.bytes_per_frame;
                Ok(Some(Param::Buffers(BufferRequirements {
                    size: ChoiceRange::new(1024 * bpf, 16 * bpf, i32::MAX as u32 / bpf),
                    stride: 0,
                    buffers: ChoiceRange::new(1, 1, MAX_BUFFERS as u32),
                    align: 16,
                })))
            }
            ParamKind::Meta => {
                if !port.have_format() {
                    return Err(NodeError::NotInitialized);
                }
                if index > 0 {
                    return Ok(None);
                }
                Ok(Some(Param::Meta(MetaRequirement {
                    kind: MetaKind::Header,
                    size: std::mem::size_of::<crate::buffer::MediaHeader>() as u32,
                })))
            }
            ParamKind::IoBuffers => {
                if index > 0 {
                    return Ok(None);
                }
                Ok(Some(Param::IoBuffers(IoRequirement {
                    kind: IoKind::Buffers,
                    size: std::mem::size_of::<IoBuffers>() as u32,
                })))
            }
        }
    }

    fn port_set_param(
        &mut self,
        direction: Direction,
        port_id: u32,
        kind: ParamKind,
        param: Option<&Param>,
    ) -> Result<(), NodeError> {
        self.check_port(direction, port_id)?;

        if kind != ParamKind::Format {
            return Err(NodeError::NotFound);
        }
        match param {
            None => self.set_format(direction, None),
            Some(Param::Format(media)) => self.set_format(direction, Some(media)),
            Some(_) => Err(NodeError::Invalid),
        }
    }

    fn port_use_buffers(
        &mut self,
        direction: Direction,
        port_id: u32,
        buffers: &[SharedBuffer],
    ) -> Result<(), NodeError> {
        self.check_port(direction, port_id)?;

        let port = self.port_mut(direction);
        if !port.have_format() {
            return Err(NodeError::NotInitialized);
        }
        if buffers.len() > MAX_BUFFERS {
            return Err(NodeError::Invalid);
        }

        log::debug!("use {} buffers on port {:?}", buffers.len(), direction);

        // Validate the whole set before touching the registry.
        for (i, shared) in buffers.iter().enumerate() {
            let b = shared.borrow();
            let ok = match b.planes.first() {
                Some(d) => !d.data.is_null(),
                None => false,
            };
            if !ok || b.id != i as u32 {
                log::error!("invalid memory on buffer {}", b.id);
                return Err(NodeError::Invalid);
            }
        }

        port.clear_buffers();

        for (i, shared) in buffers.iter().enumerate() {
            let flags = if direction == Direction::Output {
                port.queue.push_back(i as u32);
                BufferFlags::empty()
            } else {
                // The producer keeps input buffers until the scheduler
                // presents them through the I/O slot.
                BufferFlags::OUT_WITH_CONSUMER
            };
            port.buffers.push(PortBuffer { flags, shared: Arc::clone(shared) });
        }

        Ok(())
    }

    fn port_alloc_buffers(
        &mut self,
        _direction: Direction,
        _port_id: u32,
        _n_buffers: u32,
    ) -> Result<Vec<SharedBuffer>, NodeError> {
        // This node transforms data in place of the graph; it never owns
        // backing memory.
        Err(NodeError::Unsupported)
    }

    fn port_set_io(
        &mut self,
        direction: Direction,
        port_id: u32,
        kind: IoKind,
        io: Option<SharedIo>,
    ) -> Result<(), NodeError> {
        self.check_port(direction, port_id)?;

        if kind != IoKind::Buffers {
            return Err(NodeError::NotFound);
        }
        self.port_mut(direction).io = io;
        Ok(())
    }

    fn port_reuse_buffer(&mut self, port_id: u32, buffer_id: u32) -> Result<(), NodeError> {
        self.check_port(Direction::Output, port_id)?;

        if buffer_id as usize >= self.out_port.buffers.len() {
            return Err(NodeError::Invalid);
        }
        self.out_port.recycle(buffer_id);
        Ok(())
    }

    fn port_send_command(
        &mut self,
        _direction: Direction,
        _port_id: u32,
        _command: Command,
    ) -> Result<(), NodeError> {
        Err(NodeError::Unsupported)
    }

    fn process(&mut self) -> Result<IoStatus, NodeError> {
        let out_io = self.out_port.io.clone().ok_or(NodeError::IoError)?;
        let in_io = self.in_port.io.clone().ok_or(NodeError::IoError)?;
        let mut out_io = out_io.borrow_mut();

        log::trace!("process: out status {}", out_io.status);

        // The previous output has not been consumed yet.
        if out_io.status == IoStatus::HaveBuffer.raw() {
            return Ok(IoStatus::HaveBuffer);
        }

        let mut in_io = in_io.borrow_mut();
        if in_io.status != IoStatus::HaveBuffer.raw() {
            return Ok(IoStatus::NeedBuffer);
        }

        // The scheduler is done with the buffer it was handed last tick.
        if (out_io.buffer_id as usize) < self.out_port.buffers.len() {
            self.out_port.recycle(out_io.buffer_id);
            out_io.buffer_id = ID_INVALID;
        }

        if in_io.buffer_id as usize >= self.in_port.buffers.len() {
            in_io.set_error(NodeError::Invalid);
            return Err(NodeError::Invalid);
        }

        let dst_id = match self.out_port.dequeue() {
            Some(id) => id,
            None => {
                out_io.set_error(NodeError::BrokenPipe);
                return Err(NodeError::BrokenPipe);
            }
        };

        let chain = match self.chain.as_mut() {
            Some(chain) => chain,
            None => {
                self.out_port.requeue_front(dst_id);
                out_io.set_error(NodeError::IoError);
                return Err(NodeError::IoError);
            }
        };

        let src_shared = Arc::clone(&self.in_port.buffers[in_io.buffer_id as usize].shared);
        let dst_shared = Arc::clone(&self.out_port.buffers[dst_id as usize].shared);

        let (result, published_id) = {
            let src = src_shared.borrow();
            let mut dst = dst_shared.borrow_mut();
            (chain.convert(&src, &mut dst), dst.id)
        };

        if let Err(e) = result {
            // A failed tick must be externally invisible: the buffer goes
            // back to the head of the free queue.
            self.out_port.requeue_front(dst_id);
            out_io.set_error(e);
            return Err(e);
        }

        out_io.set_status(IoStatus::HaveBuffer);
        out_io.buffer_id = published_id;

        Ok(IoStatus::HaveBuffer)
    }
}
