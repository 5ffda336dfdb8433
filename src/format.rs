/// The encoding of a single audio sample in memory.
///
/// The `..Oe` variants denote the opposite of the native byte order. They
/// convert through the same kernel family as their native siblings; the
/// byte swap is folded into the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    S16,
    S16Oe,
    S24,
    S24Oe,
    S24In32,
    S24In32Oe,
    S32,
    S32Oe,
    F32,
    F32Oe,
}

impl SampleFormat {
    /// The number of bytes one sample occupies.
    pub fn stride(&self) -> u32 {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 | SampleFormat::S16Oe => 2,
            SampleFormat::S24 | SampleFormat::S24Oe => 3,
            SampleFormat::S24In32
            | SampleFormat::S24In32Oe
            | SampleFormat::S32
            | SampleFormat::S32Oe
            | SampleFormat::F32
            | SampleFormat::F32Oe => 4,
        }
    }

    /// Whether this is an opposite-endian variant.
    pub fn is_swapped(&self) -> bool {
        matches!(
            self,
            SampleFormat::S16Oe
                | SampleFormat::S24Oe
                | SampleFormat::S24In32Oe
                | SampleFormat::S32Oe
                | SampleFormat::F32Oe
        )
    }

    /// The native-endian sibling of this format.
    pub fn unswapped(&self) -> SampleFormat {
        match self {
            SampleFormat::S16Oe => SampleFormat::S16,
            SampleFormat::S24Oe => SampleFormat::S24,
            SampleFormat::S24In32Oe => SampleFormat::S24In32,
            SampleFormat::S32Oe => SampleFormat::S32,
            SampleFormat::F32Oe => SampleFormat::F32,
            other => *other,
        }
    }
}

/// How the channels of a multi-channel stream are laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleLayout {
    /// All channels share one data plane, frame by frame.
    Interleaved,
    /// One data plane per channel.
    NonInterleaved,
}

/// A fully specified raw audio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub layout: SampleLayout,
    /// Number of channels, at least 1.
    pub channels: u32,
    /// Sample rate in Hz, at least 1.
    pub rate: u32,
}

impl AudioFormat {
    pub fn new(
        sample_format: SampleFormat,
        layout: SampleLayout,
        channels: u32,
        rate: u32,
    ) -> Self {
        Self { sample_format, layout, channels, rate }
    }

    /// The number of bytes one frame (one sample per channel) occupies.
    pub fn bytes_per_frame(&self) -> u32 {
        self.sample_format.stride() * self.channels
    }

    /// Whether per-channel data lives in separate planes.
    ///
    /// A mono stream is planar regardless of the declared layout.
    pub fn is_planar(&self) -> bool {
        self.channels == 1 || self.layout == SampleLayout::NonInterleaved
    }
}

/// Top-level media classification of a format parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSubkind {
    Raw,
    Encoded,
}

/// The payload of a format parameter as handed to `set_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub media: MediaKind,
    pub subkind: MediaSubkind,
    pub audio: Option<AudioFormat>,
}

impl MediaFormat {
    pub fn audio_raw(format: AudioFormat) -> Self {
        Self { media: MediaKind::Audio, subkind: MediaSubkind::Raw, audio: Some(format) }
    }

    /// Extract the raw audio description, rejecting anything that is not
    /// audio/raw or that carries out-of-range fields.
    pub fn parse_audio(&self) -> Result<AudioFormat, crate::NodeError> {
        if self.media != MediaKind::Audio || self.subkind != MediaSubkind::Raw {
            return Err(crate::NodeError::Invalid);
        }
        let audio = self.audio.ok_or(crate::NodeError::Invalid)?;
        if audio.channels < 1 || audio.rate < 1 {
            return Err(crate::NodeError::Invalid);
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_math() {
        let f = AudioFormat::new(SampleFormat::S16, SampleLayout::Interleaved, 2, 48000);
        assert_eq!(f.bytes_per_frame(), 4);
        assert!(!f.is_planar());

        let f = AudioFormat::new(SampleFormat::F32, SampleLayout::NonInterleaved, 6, 44100);
        assert_eq!(f.bytes_per_frame(), 24);
        assert!(f.is_planar());

        let f = AudioFormat::new(SampleFormat::U8, SampleLayout::Interleaved, 1, 8000);
        assert!(f.is_planar());
    }

    #[test]
    fn swapped_variants() {
        assert!(SampleFormat::S16Oe.is_swapped());
        assert_eq!(SampleFormat::S16Oe.unswapped(), SampleFormat::S16);
        assert_eq!(SampleFormat::S16Oe.stride(), SampleFormat::S16.stride());
        assert!(!SampleFormat::F32.is_swapped());
        assert_eq!(SampleFormat::F32.unswapped(), SampleFormat::F32);
    }

    #[test]
    fn parse_rejects_non_audio() {
        let fmt = AudioFormat::new(SampleFormat::S16, SampleLayout::Interleaved, 2, 44100);
        let mut m = MediaFormat::audio_raw(fmt);
        assert!(m.parse_audio().is_ok());

        m.media = MediaKind::Video;
        assert_eq!(m.parse_audio(), Err(crate::NodeError::Invalid));

        let mut m = MediaFormat::audio_raw(fmt);
        m.subkind = MediaSubkind::Encoded;
        assert_eq!(m.parse_audio(), Err(crate::NodeError::Invalid));

        let mut bad = fmt;
        bad.channels = 0;
        assert_eq!(
            MediaFormat::audio_raw(bad).parse_audio(),
            Err(crate::NodeError::Invalid)
        );
    }
}
