//! Parameter discovery objects.
//!
//! Ports describe what they can negotiate through plain records returned
//! from `Node::port_enum_params`. A `ChoiceEnum` lists a default plus the
//! allowed alternatives; a `ChoiceRange` carries a default bounded by an
//! inclusive range (a fixed value is a range with `min == max`).

use crate::format::{MediaFormat, MediaKind, MediaSubkind, SampleFormat, SampleLayout};

/// The kinds of parameters a port can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Meta-kind: enumerates the other kinds this port understands.
    List,
    /// The formats the port can accept.
    EnumFormat,
    /// The currently accepted format.
    Format,
    /// Buffer size/count/alignment requirements.
    Buffers,
    /// Supported buffer metadata blocks.
    Meta,
    /// The I/O slot layout the port expects.
    IoBuffers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoiceEnum<T: 'static> {
    pub default: T,
    pub alternatives: &'static [T],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoiceRange<T> {
    pub default: T,
    pub min: T,
    pub max: T,
}

impl<T: Copy> ChoiceRange<T> {
    pub fn new(default: T, min: T, max: T) -> Self {
        Self { default, min, max }
    }

    /// A range collapsed to a single admissible value.
    pub fn fixed(value: T) -> Self {
        Self { default: value, min: value, max: value }
    }
}

impl<T: Copy + PartialEq> ChoiceRange<T> {
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

/// The format alternatives a port advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatChoices {
    pub media: MediaKind,
    pub subkind: MediaSubkind,
    pub sample_format: ChoiceEnum<SampleFormat>,
    pub layout: ChoiceEnum<SampleLayout>,
    pub rate: ChoiceRange<u32>,
    pub channels: ChoiceRange<u32>,
}

/// Buffer requirements advertised by a port with a negotiated format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequirements {
    /// Payload bytes per data plane.
    pub size: ChoiceRange<u32>,
    pub stride: u32,
    /// How many buffers the port wants registered.
    pub buffers: ChoiceRange<u32>,
    pub align: u32,
}

/// Metadata blocks a port knows how to carry on its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRequirement {
    pub kind: MetaKind,
    /// Size in bytes of the metadata block.
    pub size: u32,
}

/// The kinds of shared I/O areas a port can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// The buffer-handoff slot.
    Buffers,
    /// Flow-control hints; not used by this node.
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRequirement {
    pub kind: IoKind,
    /// Size in bytes of the shared area.
    pub size: u32,
}

/// One parameter object returned from `port_enum_params`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    List(ParamKind),
    EnumFormat(FormatChoices),
    Format(MediaFormat),
    Buffers(BufferRequirements),
    Meta(MetaRequirement),
    IoBuffers(IoRequirement),
}
