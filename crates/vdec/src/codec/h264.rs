//! Stateless H.264 frame decoding.
use std::collections::VecDeque;

use tracing::{debug, warn};
use vdec_core::{
    h264::DPB_ENTRIES,
    prelude::{
        ControlId, ControlKind, ControlMeta, ControlValue, H264Sps, ImageFormatClass,
        PixFormat, PlaneFormat,
    },
};
use vdec_platform::prelude::{CoherentBlock, RegisterIo};

use super::{CodecOps, DoneContext, RunContext, StreamContext};
use crate::{
    error::{DecodeError, JobResult},
    regs,
};

/// Worst-case bytes per pixel of a coded picture, used to size bitstream buffers.
const MAX_DEPTH_IN_BYTES: u64 = 2;

/// CABAC tables, scaling lists and parameter sets the hardware reads per picture.
pub const PRIV_TABLE_SIZE: u64 = 0x4800;

/// `V4L2_STATELESS_H264_DECODE_MODE_FRAME_BASED`.
pub const DECODE_MODE_FRAME_BASED: i64 = 1;
/// `V4L2_STATELESS_H264_START_CODE_ANNEX_B`.
pub const START_CODE_ANNEX_B: i64 = 1;

pub const PROFILE_CONSTRAINED_BASELINE: i64 = 1;
pub const PROFILE_MAIN: i64 = 2;
pub const PROFILE_EXTENDED: i64 = 3;
pub const PROFILE_HIGH_444_PREDICTIVE: i64 = 7;
pub const PROFILE_HIGH_422_INTRA: i64 = 9;
pub const LEVEL_1_0: i64 = 0;
pub const LEVEL_6_1: i64 = 18;

static H264_CONTROLS: [ControlMeta; 8] = [
    ControlMeta::compound(
        ControlId::H264_DECODE_PARAMS,
        "H264 Decode Parameters",
        ControlKind::H264DecodeParams,
    ),
    ControlMeta::compound(ControlId::H264_SPS, "H264 Sequence Parameter Set", ControlKind::H264Sps)
        .format_aware(),
    ControlMeta::compound(ControlId::H264_PPS, "H264 Picture Parameter Set", ControlKind::H264Pps),
    ControlMeta::compound(
        ControlId::H264_SCALING_MATRIX,
        "H264 Scaling Matrix",
        ControlKind::H264ScalingMatrix,
    ),
    ControlMeta::menu(
        ControlId::H264_DECODE_MODE,
        "H264 Decode Mode",
        DECODE_MODE_FRAME_BASED,
        DECODE_MODE_FRAME_BASED,
        DECODE_MODE_FRAME_BASED,
    ),
    ControlMeta::menu(
        ControlId::H264_START_CODE,
        "H264 Start Code",
        START_CODE_ANNEX_B,
        START_CODE_ANNEX_B,
        START_CODE_ANNEX_B,
    ),
    ControlMeta::menu(
        ControlId::H264_PROFILE,
        "H264 Profile",
        PROFILE_CONSTRAINED_BASELINE,
        PROFILE_HIGH_422_INTRA,
        PROFILE_MAIN,
    )
    .skip((1 << PROFILE_EXTENDED) | (1 << PROFILE_HIGH_444_PREDICTIVE)),
    ControlMeta::menu(ControlId::H264_LEVEL, "H264 Level", LEVEL_1_0, LEVEL_6_1, LEVEL_1_0),
];

/// Controls every H.264 session registers.
pub fn h264_controls() -> &'static [ControlMeta] {
    &H264_CONTROLS
}

/// H.264 operation table.
#[derive(Debug, Default)]
pub struct H264Ops;

pub static H264_OPS: H264Ops = H264Ops;

#[derive(Debug, Clone, Copy)]
struct RefPicture {
    timestamp: u64,
    dma_addr: u64,
}

struct H264Private {
    table: CoherentBlock,
    references: VecDeque<RefPicture>,
}

impl H264Private {
    fn reference(&self, timestamp: u64) -> Option<u64> {
        self.references
            .iter()
            .rev()
            .find(|r| r.timestamp == timestamp)
            .map(|r| r.dma_addr)
    }
}

fn sps_image_fmt(sps: &H264Sps) -> ImageFormatClass {
    match (sps.chroma_format_idc, sps.bit_depth_luma_minus8) {
        (1, 0) => ImageFormatClass::Yuv420_8,
        (1, 2) => ImageFormatClass::Yuv420_10,
        (2, 0) => ImageFormatClass::Yuv422_8,
        (2, 2) => ImageFormatClass::Yuv422_10,
        _ => ImageFormatClass::Any,
    }
}

fn validate_sps(coded: &PixFormat, sps: &H264Sps) -> Result<(), &'static str> {
    // 4:4:4 and monochrome-with-separate-planes are not decodable.
    if sps.chroma_format_idc > 2 {
        return Err("unsupported chroma format");
    }
    if sps.bit_depth_luma_minus8 != sps.bit_depth_chroma_minus8 {
        return Err("luma and chroma bit depth differ");
    }
    if sps.bit_depth_luma_minus8 != 0 && sps.bit_depth_luma_minus8 != 2 {
        return Err("only 8 and 10 bit streams are supported");
    }
    if sps.width() > coded.width || sps.height() > coded.height {
        return Err("picture larger than the coded format");
    }
    Ok(())
}

// Address registers hold 32 bits; the translation unit keeps device addresses below 4 GiB.
fn write_addr(io: &dyn RegisterIo, offset: u32, addr: u64) {
    io.write(offset, addr as u32);
}

impl CodecOps for H264Ops {
    fn name(&self) -> &'static str {
        "h264"
    }

    fn adjust_fmt(&self, fmt: &mut PixFormat) -> Result<(), DecodeError> {
        fmt.planes.truncate(1);
        if fmt.planes.is_empty() {
            fmt.planes.push(PlaneFormat::default());
        }
        let plane = &mut fmt.planes[0];
        plane.bytesperline = 0;
        if plane.sizeimage == 0 {
            plane.sizeimage = u64::from(fmt.width) * u64::from(fmt.height) * MAX_DEPTH_IN_BYTES;
        }
        Ok(())
    }

    fn try_ctrl(
        &self,
        coded: &PixFormat,
        id: ControlId,
        value: &ControlValue,
    ) -> Result<(), DecodeError> {
        if id != ControlId::H264_SPS {
            return Ok(());
        }
        let sps = value
            .as_h264_sps()
            .ok_or_else(|| DecodeError::control(id, "expected an SPS payload"))?;
        validate_sps(coded, sps).map_err(|reason| DecodeError::control(id, reason))
    }

    fn get_image_fmt(&self, id: ControlId, value: &ControlValue) -> Option<ImageFormatClass> {
        if id != ControlId::H264_SPS {
            return None;
        }
        value.as_h264_sps().map(sps_image_fmt)
    }

    fn start(&self, ctx: StreamContext<'_>) -> Result<(), DecodeError> {
        let table = ctx
            .coherent
            .alloc(PRIV_TABLE_SIZE)
            .map_err(|_| DecodeError::OutOfMemory {
                what: "h264 private table",
                size: PRIV_TABLE_SIZE,
            })?;
        ctx.private.set(H264Private {
            table,
            references: VecDeque::with_capacity(DPB_ENTRIES),
        });
        Ok(())
    }

    fn stop(&self, ctx: StreamContext<'_>) {
        if let Some(private) = ctx.private.take::<H264Private>() {
            ctx.coherent.free(private.table);
        }
    }

    fn run(&self, ctx: RunContext<'_>) -> Result<(), DecodeError> {
        let RunContext {
            regs: io,
            controls,
            decoded,
            colmv_offset,
            rcb,
            private,
            source,
            destination,
            ..
        } = ctx;
        let private = private
            .get_mut::<H264Private>()
            .ok_or_else(|| DecodeError::HardwareProgramming("h264 context not started".into()))?;
        let sps = controls
            .value(ControlId::H264_SPS)
            .and_then(ControlValue::as_h264_sps)
            .ok_or_else(|| DecodeError::HardwareProgramming("missing SPS".into()))?;
        let params = controls
            .value(ControlId::H264_DECODE_PARAMS)
            .and_then(ControlValue::as_h264_decode_params)
            .ok_or_else(|| DecodeError::HardwareProgramming("missing decode parameters".into()))?;
        controls
            .value(ControlId::H264_PPS)
            .and_then(ControlValue::as_h264_pps)
            .ok_or_else(|| DecodeError::HardwareProgramming("missing PPS".into()))?;

        let stream_len = source.bytesused(0);
        if stream_len == 0 {
            return Err(DecodeError::HardwareProgramming("empty bitstream".into()));
        }
        if sps.width() > decoded.width || sps.height() > decoded.height {
            return Err(DecodeError::HardwareProgramming(format!(
                "{}x{} picture does not fit {}x{} buffers",
                sps.width(),
                sps.height(),
                decoded.width,
                decoded.height
            )));
        }

        let dst = destination.dma_addr(0);
        let stride = decoded.planes.first().map(|p| p.bytesperline).unwrap_or(0);
        let mb_w = sps.width() / 16;
        let mb_h = sps.height() / 16;

        io.write(regs::REG_IMPORTANT_EN, 0);
        io.write(regs::REG_TIMEOUT_THRESHOLD, regs::TIMEOUT_THRESHOLD_CYCLES);
        io.write(regs::REG_PIC_SIZE, (mb_w - 1) | ((mb_h - 1) << 16));
        io.write(regs::REG_Y_STRIDE, stride);
        io.write(regs::REG_UV_STRIDE, stride);
        write_addr(io, regs::REG_STRM_BASE, source.dma_addr(0));
        io.write(regs::REG_STRM_LEN, stream_len as u32);
        write_addr(io, regs::REG_DST_BASE, dst);
        write_addr(io, regs::REG_COLMV_BASE, dst + colmv_offset);
        write_addr(io, regs::REG_TABLE_BASE, private.table.dma_addr);

        for buf in rcb.iter() {
            let index = buf.purpose.index();
            write_addr(io, regs::rcb_addr_reg(index), buf.dma_addr);
            io.write(regs::rcb_size_reg(index), buf.size as u32);
        }

        for (index, entry) in params.dpb.iter().enumerate() {
            let addr = if entry.is_active() {
                private.reference(entry.reference_ts).unwrap_or_else(|| {
                    warn!(timestamp = entry.reference_ts, "missing reference picture");
                    dst
                })
            } else {
                dst
            };
            write_addr(io, regs::ref_base_reg(index), addr);
        }

        debug!(
            width = sps.width(),
            height = sps.height(),
            frame_num = params.frame_num,
            "h264 picture programmed"
        );
        io.write(regs::REG_DEC_E, regs::DEC_E_START);
        Ok(())
    }

    fn done(&self, ctx: DoneContext<'_>, result: JobResult) {
        let Some(private) = ctx.private.get_mut::<H264Private>() else {
            return;
        };
        let timestamp = ctx.destination.timestamp;
        private.references.retain(|r| r.timestamp != timestamp);
        if result.is_ok() {
            if private.references.len() == DPB_ENTRIES {
                private.references.pop_front();
            }
            private.references.push_back(RefPicture {
                timestamp,
                dma_addr: ctx.destination.dma_addr(0),
            });
        }
    }
}
