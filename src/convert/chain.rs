//! Conversion chain planning and execution.
//!
//! A chain is a linear sequence of steps from the input format to the
//! output format. Steps communicate through planar `f32` scratch planes;
//! the first and last step read from and write to the external buffers
//! directly when they can.

use smallvec::SmallVec;

use crate::buffer::HostBuffer;
use crate::error::NodeError;
use crate::format::{AudioFormat, SampleFormat};

use super::kernels::{find_pack_kernels, PackKernels};

/// Mix `src` planes into a different number of `dst` planes, `frames`
/// samples each.
pub type RemixFn = fn(dst: &mut [&mut [f32]], src: &[&[f32]], frames: usize);

/// Resample every plane of `src` into `dst`, returning the number of
/// frames produced.
pub type ResampleFn =
    fn(dst: &mut [&mut [f32]], src: &[&[f32]], in_rate: u32, out_rate: u32, in_frames: usize) -> usize;

/// The pluggable pure kernels for channel remixing and rate conversion.
///
/// These are deliberately not provided by this crate; hosts inject them
/// through the factory support set.
#[derive(Debug, Clone, Copy)]
pub struct DspKernels {
    pub remix: RemixFn,
    pub resample: ResampleFn,
}

/// What one chain step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Unpack,
    Downmix,
    Resample,
    Upmix,
    Pack,
}

#[derive(Clone, Copy)]
struct ChainStep {
    kind: StepKind,
    /// Conversion kernel family, for `Unpack` and `Pack` steps.
    pack: Option<&'static PackKernels>,
    /// Channel count after this step.
    channels: u32,
}

/// A planned conversion pipeline between two negotiated formats.
pub struct Chain {
    steps: SmallVec<[ChainStep; 5]>,
    in_format: AudioFormat,
    out_format: AudioFormat,
    dsp: Option<DspKernels>,
    /// Ping-pong scratch planes for the staged path, grown on demand.
    scratch: [Vec<Vec<f32>>; 2],
}

impl Chain {
    /// Plan the steps between `in_format` and `out_format`.
    ///
    /// Fails with `Invalid` when a needed pack/unpack kernel family is
    /// missing from the table, or when a remix/resample step is required
    /// but no DSP kernels were injected.
    pub fn plan(
        in_format: AudioFormat,
        out_format: AudioFormat,
        dsp: Option<DspKernels>,
    ) -> Result<Chain, NodeError> {
        let mut steps: SmallVec<[ChainStep; 5]> = SmallVec::new();
        let mut channels = in_format.channels;
        let mut rate = in_format.rate;

        let need_dsp = |step: StepKind| -> Result<(), NodeError> {
            if dsp.is_none() {
                log::debug!("chain: {:?} step needed but no DSP kernels installed", step);
                return Err(NodeError::Invalid);
            }
            Ok(())
        };

        if in_format.sample_format != SampleFormat::F32 || !in_format.is_planar() {
            let pack = find_pack_kernels(in_format.sample_format).ok_or(NodeError::Invalid)?;
            log::debug!("chain: setup unpack {:?}", in_format.sample_format);
            steps.push(ChainStep { kind: StepKind::Unpack, pack: Some(pack), channels });
        }

        if channels > out_format.channels {
            need_dsp(StepKind::Downmix)?;
            log::debug!("chain: setup downmix {} -> {}", channels, out_format.channels);
            channels = out_format.channels;
            steps.push(ChainStep { kind: StepKind::Downmix, pack: None, channels });
        }

        if rate != out_format.rate {
            need_dsp(StepKind::Resample)?;
            log::debug!("chain: setup resample {} -> {}", rate, out_format.rate);
            rate = out_format.rate;
            steps.push(ChainStep { kind: StepKind::Resample, pack: None, channels });
        }

        if channels < out_format.channels {
            need_dsp(StepKind::Upmix)?;
            log::debug!("chain: setup upmix {} -> {}", channels, out_format.channels);
            channels = out_format.channels;
            steps.push(ChainStep { kind: StepKind::Upmix, pack: None, channels });
        }

        if out_format.sample_format != SampleFormat::F32 || !out_format.is_planar() {
            let pack = find_pack_kernels(out_format.sample_format).ok_or(NodeError::Invalid)?;
            log::debug!("chain: setup pack {:?}", out_format.sample_format);
            steps.push(ChainStep { kind: StepKind::Pack, pack: Some(pack), channels });
        }

        if steps.is_empty() {
            // Formats agree on the canonical form already: a single planar
            // copy keeps the executor uniform.
            let pack = find_pack_kernels(SampleFormat::F32).ok_or(NodeError::Invalid)?;
            steps.push(ChainStep { kind: StepKind::Pack, pack: Some(pack), channels });
        }

        Ok(Chain {
            steps,
            in_format,
            out_format,
            dsp,
            scratch: [Vec::new(), Vec::new()],
        })
    }

    /// The step kinds, in execution order.
    pub fn step_kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|s| s.kind).collect()
    }

    /// Run the chain on one (source, destination) buffer pair.
    pub fn convert(&mut self, src: &HostBuffer, dst: &mut HostBuffer) -> Result<(), NodeError> {
        log::trace!("chain: convert {} steps", self.steps.len());

        // A lone pack or unpack works on the external planes directly.
        if self.steps.len() == 1 {
            let step = self.steps[0];
            match (step.kind, step.pack) {
                (StepKind::Unpack, Some(pack)) => return unpack_external(pack, src, dst),
                (StepKind::Pack, Some(pack)) => {
                    let srcs: SmallVec<[&[u8]; 8]> =
                        src.planes.iter().map(|p| p.bytes()).collect();
                    return pack_planes(pack, &srcs, dst);
                }
                _ => {}
            }
        }

        self.convert_staged(src, dst)
    }

    /// The general path: materialize canonical planar f32 in scratch,
    /// walk the middle steps, then emit into the destination.
    fn convert_staged(&mut self, src: &HostBuffer, dst: &mut HostBuffer) -> Result<(), NodeError> {
        let steps = self.steps.clone();
        let mut frames = input_frames(&self.in_format, src)?;
        let mut channels = self.in_format.channels as usize;
        let mut cur = 0usize;

        let mut next_step = 0;
        if steps[next_step].kind == StepKind::Unpack {
            let pack = steps[next_step].pack.ok_or(NodeError::Invalid)?;
            ensure_planes(&mut self.scratch[cur], channels, frames);
            let mut views: SmallVec<[&mut [u8]; 8]> = self.scratch[cur]
                .iter_mut()
                .take(channels)
                .map(|p| f32_bytes_mut(&mut p[..frames]))
                .collect();
            if src.planes.len() == 1 && channels > 1 {
                (pack.unpack)(&mut views, src.planes[0].bytes());
            } else {
                if src.planes.len() != channels {
                    return Err(NodeError::Invalid);
                }
                for (view, plane) in views.iter_mut().zip(src.planes.iter()) {
                    (pack.unpack_one)(view, plane.bytes());
                }
            }
            next_step += 1;
        } else {
            // Input is already canonical; stage it so the middle steps
            // have typed planes to work on.
            if src.planes.len() != channels {
                return Err(NodeError::Invalid);
            }
            ensure_planes(&mut self.scratch[cur], channels, frames);
            for (plane, sp) in src.planes.iter().zip(self.scratch[cur].iter_mut()) {
                f32_bytes_mut(&mut sp[..frames]).copy_from_slice(&plane.bytes()[..frames * 4]);
            }
        }

        let mut packed = false;
        for step in &steps[next_step..] {
            match step.kind {
                StepKind::Downmix | StepKind::Upmix => {
                    let dsp = self.dsp.ok_or(NodeError::Invalid)?;
                    let out_channels = step.channels as usize;
                    let (a, b) = split_scratch(&mut self.scratch, cur);
                    ensure_planes(b, out_channels, frames);
                    let srcs: SmallVec<[&[f32]; 8]> =
                        a[..channels].iter().map(|p| &p[..frames]).collect();
                    let mut dsts: SmallVec<[&mut [f32]; 8]> =
                        b[..out_channels].iter_mut().map(|p| &mut p[..frames]).collect();
                    (dsp.remix)(&mut dsts, &srcs, frames);
                    channels = out_channels;
                    cur = 1 - cur;
                }
                StepKind::Resample => {
                    let dsp = self.dsp.ok_or(NodeError::Invalid)?;
                    let in_rate = self.in_format.rate;
                    let out_rate = self.out_format.rate;
                    let out_cap =
                        (frames as u64 * out_rate as u64 / in_rate as u64 + 1) as usize;
                    let (a, b) = split_scratch(&mut self.scratch, cur);
                    ensure_planes(b, channels, out_cap);
                    let srcs: SmallVec<[&[f32]; 8]> =
                        a[..channels].iter().map(|p| &p[..frames]).collect();
                    let mut dsts: SmallVec<[&mut [f32]; 8]> =
                        b[..channels].iter_mut().map(|p| &mut p[..out_cap]).collect();
                    frames = (dsp.resample)(&mut dsts, &srcs, in_rate, out_rate, frames);
                    cur = 1 - cur;
                }
                StepKind::Pack => {
                    let pack = step.pack.ok_or(NodeError::Invalid)?;
                    let srcs: SmallVec<[&[u8]; 8]> = self.scratch[cur][..channels]
                        .iter()
                        .map(|p| f32_bytes(&p[..frames]))
                        .collect();
                    pack_planes(pack, &srcs, dst)?;
                    packed = true;
                }
                StepKind::Unpack => return Err(NodeError::Invalid),
            }
        }

        if !packed {
            // Chain ended on a remix/resample step; the destination wants
            // canonical planar f32.
            if dst.planes.len() != channels {
                return Err(NodeError::Invalid);
            }
            for (plane, sp) in dst.planes.iter_mut().zip(self.scratch[cur].iter()) {
                let bytes = frames * 4;
                if bytes > plane.max_size as usize {
                    return Err(NodeError::Invalid);
                }
                plane.bytes_mut()[..bytes].copy_from_slice(f32_bytes(&sp[..frames]));
                plane.size = bytes as u32;
            }
        }

        Ok(())
    }
}

/// Frames carried by the source buffer under the input format.
fn input_frames(format: &AudioFormat, src: &HostBuffer) -> Result<usize, NodeError> {
    let stride = format.sample_format.stride() as usize;
    let p0 = src.planes.first().ok_or(NodeError::Invalid)?;
    if src.planes.len() > 1 {
        Ok(p0.size as usize / stride)
    } else {
        Ok(p0.size as usize / (stride * format.channels as usize))
    }
}

/// Unpack straight into the destination buffer (unpack-only chains).
fn unpack_external(
    pack: &'static PackKernels,
    src: &HostBuffer,
    dst: &mut HostBuffer,
) -> Result<(), NodeError> {
    let in_stride = pack.format.stride() as usize;
    log::trace!("chain: unpack {} -> {} planes", src.planes.len(), dst.planes.len());

    if src.planes.len() == dst.planes.len() && !src.planes.is_empty() {
        for i in 0..dst.planes.len() {
            let out_bytes = (src.planes[i].size as usize / in_stride) * 4;
            if out_bytes > dst.planes[i].max_size as usize {
                return Err(NodeError::Invalid);
            }
            let src_bytes = src.planes[i].bytes();
            let written = (pack.unpack_one)(dst.planes[i].bytes_mut(), src_bytes);
            dst.planes[i].size = written as u32;
        }
    } else {
        let n_ch = dst.planes.len();
        if n_ch == 0 {
            return Err(NodeError::Invalid);
        }
        let p0 = src.planes.first().ok_or(NodeError::Invalid)?;
        let frames = p0.size as usize / (in_stride * n_ch);
        if frames * 4 > dst.planes.iter().map(|p| p.max_size as usize).min().unwrap_or(0) {
            return Err(NodeError::Invalid);
        }
        let src_bytes = p0.bytes();
        let written = {
            let mut views: SmallVec<[&mut [u8]; 8]> =
                dst.planes.iter_mut().map(|p| p.bytes_mut()).collect();
            (pack.unpack)(&mut views, src_bytes)
        };
        for plane in dst.planes.iter_mut() {
            plane.size = written as u32;
        }
    }
    Ok(())
}

/// Pack the given planar-f32 source planes into the destination buffer.
fn pack_planes(
    pack: &'static PackKernels,
    srcs: &[&[u8]],
    dst: &mut HostBuffer,
) -> Result<(), NodeError> {
    let out_stride = pack.format.stride() as usize;
    log::trace!("chain: pack {} -> {} planes", srcs.len(), dst.planes.len());

    if srcs.len() == dst.planes.len() && !srcs.is_empty() {
        for (i, src) in srcs.iter().enumerate() {
            let out_bytes = (src.len() / 4) * out_stride;
            if out_bytes > dst.planes[i].max_size as usize {
                return Err(NodeError::Invalid);
            }
            let written = (pack.pack_one)(dst.planes[i].bytes_mut(), src);
            dst.planes[i].size = written as u32;
        }
    } else {
        let p0 = dst.planes.first_mut().ok_or(NodeError::Invalid)?;
        let src0 = srcs.first().ok_or(NodeError::Invalid)?;
        let out_bytes = (src0.len() / 4) * out_stride * srcs.len();
        if out_bytes > p0.max_size as usize {
            return Err(NodeError::Invalid);
        }
        let written = (pack.pack)(p0.bytes_mut(), srcs);
        p0.size = written as u32;
    }
    Ok(())
}

/// Grow `planes` to `channels` planes of at least `frames` samples.
fn ensure_planes(planes: &mut Vec<Vec<f32>>, channels: usize, frames: usize) {
    if planes.len() < channels {
        planes.resize_with(channels, Vec::new);
    }
    for p in planes.iter_mut().take(channels) {
        if p.len() < frames {
            p.resize(frames, 0.0);
        }
    }
}

fn split_scratch(
    scratch: &mut [Vec<Vec<f32>>; 2],
    cur: usize,
) -> (&mut Vec<Vec<f32>>, &mut Vec<Vec<f32>>) {
    let (lo, hi) = scratch.split_at_mut(1);
    if cur == 0 {
        (&mut lo[0], &mut hi[0])
    } else {
        (&mut hi[0], &mut lo[0])
    }
}

// Scratch planes are plain `Vec<f32>`; widening an f32 slice to bytes is
// always in-bounds and alignment-free.

#[inline]
fn f32_bytes(p: &[f32]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(p.as_ptr() as *const u8, p.len() * 4) }
}

#[inline]
fn f32_bytes_mut(p: &mut [f32]) -> &mut [u8] {
    unsafe { std::slice::from_raw_parts_mut(p.as_mut_ptr() as *mut u8, p.len() * 4) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleLayout;

    fn fmt(
        sample_format: SampleFormat,
        layout: SampleLayout,
        channels: u32,
        rate: u32,
    ) -> AudioFormat {
        AudioFormat::new(sample_format, layout, channels, rate)
    }

    fn dummy_remix(dst: &mut [&mut [f32]], src: &[&[f32]], frames: usize) {
        for d in dst.iter_mut() {
            d[..frames].copy_from_slice(&src[0][..frames]);
        }
    }

    fn dummy_resample(
        dst: &mut [&mut [f32]],
        src: &[&[f32]],
        _in_rate: u32,
        _out_rate: u32,
        in_frames: usize,
    ) -> usize {
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            d[..in_frames].copy_from_slice(&s[..in_frames]);
        }
        in_frames
    }

    fn dsp() -> DspKernels {
        DspKernels { remix: dummy_remix, resample: dummy_resample }
    }

    #[test]
    fn pass_through_plans_single_copy_step() {
        let f = fmt(SampleFormat::F32, SampleLayout::NonInterleaved, 2, 48000);
        let chain = Chain::plan(f, f, None).unwrap();
        assert_eq!(chain.step_kinds(), vec![StepKind::Pack]);
    }

    #[test]
    fn interleave_plans_pack_only() {
        let a = fmt(SampleFormat::F32, SampleLayout::NonInterleaved, 2, 48000);
        let b = fmt(SampleFormat::F32, SampleLayout::Interleaved, 2, 48000);
        let chain = Chain::plan(a, b, None).unwrap();
        assert_eq!(chain.step_kinds(), vec![StepKind::Pack]);
    }

    #[test]
    fn s16_to_planar_plans_unpack_only() {
        let a = fmt(SampleFormat::S16, SampleLayout::Interleaved, 2, 44100);
        let b = fmt(SampleFormat::F32, SampleLayout::NonInterleaved, 2, 44100);
        let chain = Chain::plan(a, b, None).unwrap();
        assert_eq!(chain.step_kinds(), vec![StepKind::Unpack]);
    }

    #[test]
    fn stereo_to_mono_plans_downmix() {
        let a = fmt(SampleFormat::S16, SampleLayout::Interleaved, 2, 48000);
        let b = fmt(SampleFormat::S16, SampleLayout::Interleaved, 1, 48000);
        let chain = Chain::plan(a, b, Some(dsp())).unwrap();
        assert_eq!(
            chain.step_kinds(),
            vec![StepKind::Unpack, StepKind::Downmix, StepKind::Pack]
        );
    }

    #[test]
    fn rate_and_channel_change_orders_steps() {
        let a = fmt(SampleFormat::S16, SampleLayout::Interleaved, 1, 44100);
        let b = fmt(SampleFormat::S16, SampleLayout::Interleaved, 2, 48000);
        let chain = Chain::plan(a, b, Some(dsp())).unwrap();
        assert_eq!(
            chain.step_kinds(),
            vec![StepKind::Unpack, StepKind::Resample, StepKind::Upmix, StepKind::Pack]
        );
    }

    #[test]
    fn planning_is_deterministic() {
        let a = fmt(SampleFormat::S16Oe, SampleLayout::Interleaved, 2, 44100);
        let b = fmt(SampleFormat::U8, SampleLayout::Interleaved, 1, 48000);
        let first = Chain::plan(a, b, Some(dsp())).unwrap().step_kinds();
        for _ in 0..3 {
            assert_eq!(Chain::plan(a, b, Some(dsp())).unwrap().step_kinds(), first);
        }
    }

    #[test]
    fn missing_kernel_family_is_invalid() {
        let a = fmt(SampleFormat::S24, SampleLayout::Interleaved, 2, 44100);
        let b = fmt(SampleFormat::F32, SampleLayout::NonInterleaved, 2, 44100);
        assert_eq!(Chain::plan(a, b, None).err(), Some(NodeError::Invalid));

        let a = fmt(SampleFormat::F32, SampleLayout::NonInterleaved, 2, 44100);
        let b = fmt(SampleFormat::S32, SampleLayout::Interleaved, 2, 44100);
        assert_eq!(Chain::plan(a, b, None).err(), Some(NodeError::Invalid));
    }

    #[test]
    fn remix_without_dsp_kernels_is_invalid() {
        let a = fmt(SampleFormat::S16, SampleLayout::Interleaved, 2, 48000);
        let b = fmt(SampleFormat::S16, SampleLayout::Interleaved, 1, 48000);
        assert_eq!(Chain::plan(a, b, None).err(), Some(NodeError::Invalid));
    }
}
