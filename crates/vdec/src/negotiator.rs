//! Coded and decoded format state of a session, and how control changes move it.
//!
//! Every `try_*` function is pure. `commit_*` functions enforce the busy rules
//! before storing anything, so a rejected commit leaves the session untouched.
use tracing::{debug, warn};
use vdec_core::prelude::{
    Colorimetry, ControlId, ControlValue, Field, FourCc, FrameSizeStepwise, PixFormat,
    PlaneFormat, fill_pixfmt,
};

use crate::{
    controls::ControlHandler,
    error::DecodeError,
    formats::{CodedFormatDesc, coded_formats, default_coded_format, find_coded_format},
    session::SessionState,
};

/// Bytes of motion-vector storage per 16x16 macroblock.
const COLMV_BYTES_PER_MB: u64 = 128;

/// Lay out `pix` as `fourcc` at `width` x `height` and append motion-vector storage to plane 0.
///
/// Returns the offset inside plane 0 where the motion-vector region begins.
///
/// # Example
/// ```rust
/// use vdec::prelude::*;
///
/// let mut pix = PixFormat::new(FourCc::NV12, 0, 0);
/// let colmv = fill_decoded_layout(&mut pix, FourCc::NV12, 1920, 1088).unwrap();
/// assert_eq!(colmv, 3_133_440);
/// assert_eq!(pix.plane_size(0), 3_133_440 + 1_044_480);
/// ```
pub fn fill_decoded_layout(
    pix: &mut PixFormat,
    fourcc: FourCc,
    width: u32,
    height: u32,
) -> Result<u64, DecodeError> {
    fill_pixfmt(pix, fourcc, width, height)
        .map_err(|e| DecodeError::InvalidFormat(e.to_string()))?;
    let macroblocks = u64::from(width.div_ceil(16)) * u64::from(height.div_ceil(16));
    let plane = pix
        .planes
        .first_mut()
        .ok_or_else(|| DecodeError::InvalidFormat(format!("{fourcc} has no memory plane")))?;
    let offset = plane.sizeimage;
    plane.sizeimage += COLMV_BYTES_PER_MB * macroblocks;
    Ok(offset)
}

/// Point the session at the first coded format, at its minimum geometry.
pub(crate) fn reset_coded_format(state: &mut SessionState) {
    let desc = default_coded_format();
    let mut fmt = PixFormat::new(desc.fourcc, desc.frmsize.min_width, desc.frmsize.min_height);
    fmt.field = Field::None;
    fmt.colorimetry = Colorimetry::rec709();
    if let Err(err) = desc.ops.adjust_fmt(&mut fmt) {
        warn!(codec = desc.ops.name(), error = %err, "adjusting default coded format failed");
    }
    state.coded_desc = desc;
    state.coded = fmt;
}

/// Pick the default decoded format for the current class, sized from the coded format.
pub(crate) fn reset_decoded_format(state: &mut SessionState) {
    let desc = state.coded_desc;
    let Some(first) = desc
        .first_decoded(state.image_fmt)
        .or_else(|| desc.decoded.first())
    else {
        warn!(coded = %desc.fourcc, "coded format lists no decoded formats");
        return;
    };
    let (width, height) = (state.coded.width, state.coded.height);
    let mut fmt = PixFormat::new(first.fourcc, width, height);
    fmt.field = Field::None;
    fmt.colorimetry = Colorimetry::rec709();
    match fill_decoded_layout(&mut fmt, first.fourcc, width, height) {
        Ok(offset) => state.colmv_offset = offset,
        Err(err) => warn!(error = %err, "laying out default decoded format failed"),
    }
    debug!(fourcc = %fmt.fourcc, width, height, "decoded format reset");
    state.decoded = fmt;
}

/// Normalize a requested coded format without touching the session.
pub fn try_output_format(
    requested: &PixFormat,
) -> Result<(&'static CodedFormatDesc, PixFormat), DecodeError> {
    let desc = find_coded_format(requested.fourcc).unwrap_or_else(default_coded_format);
    let mut fmt = requested.clone();
    fmt.fourcc = desc.fourcc;
    (fmt.width, fmt.height) = desc.frmsize.constrain(requested.width, requested.height);
    fmt.field = Field::None;
    fmt.planes.truncate(1);
    if fmt.planes.is_empty() {
        fmt.planes.push(PlaneFormat::default());
    }
    desc.ops.adjust_fmt(&mut fmt)?;
    Ok((desc, fmt))
}

pub(crate) fn commit_output_format(
    state: &mut SessionState,
    requested: &PixFormat,
) -> Result<PixFormat, DecodeError> {
    // A streaming coded queue pins every coded field; allocated buffers only pin the fourcc.
    let source = &state.source;
    if source.streaming || (source.is_busy() && requested.fourcc != state.coded.fourcc) {
        return Err(DecodeError::Busy("coded queue is busy"));
    }
    if state.destination.is_busy() {
        return Err(DecodeError::Busy("decoded queue is busy"));
    }
    let (desc, fmt) = try_output_format(requested)?;
    if !std::ptr::eq(desc, state.coded_desc) {
        state.controls = ControlHandler::new((desc.controls)());
    }
    state.coded_desc = desc;
    state.coded = fmt;

    reset_decoded_format(state);
    state.decoded.colorimetry = state.coded.colorimetry;
    state.source.features = state.source.features.union(desc.features);
    Ok(state.coded.clone())
}

fn negotiate_decoded(
    state: &SessionState,
    requested: &PixFormat,
) -> Result<(PixFormat, u64), DecodeError> {
    let desc = state.coded_desc;
    let fourcc = if desc.is_valid_decoded(requested.fourcc, state.image_fmt) {
        requested.fourcc
    } else {
        desc.first_decoded(state.image_fmt)
            .ok_or(DecodeError::NoDecodedFormat(desc.fourcc))?
            .fourcc
    };
    // Decoded buffers are never smaller than the coded picture.
    let width = requested.width.max(state.coded.width);
    let height = requested.height.max(state.coded.height);
    let (width, height) = desc.frmsize.constrain(width, height);

    let mut fmt = PixFormat::new(fourcc, width, height);
    fmt.field = Field::None;
    fmt.colorimetry = state.decoded.colorimetry;
    let offset = fill_decoded_layout(&mut fmt, fourcc, width, height)?;
    Ok((fmt, offset))
}

pub(crate) fn try_decoded_format(
    state: &SessionState,
    requested: &PixFormat,
) -> Result<PixFormat, DecodeError> {
    negotiate_decoded(state, requested).map(|(fmt, _)| fmt)
}

pub(crate) fn commit_decoded_format(
    state: &mut SessionState,
    requested: &PixFormat,
) -> Result<PixFormat, DecodeError> {
    if state.destination.is_busy() {
        return Err(DecodeError::Busy("decoded queue is busy"));
    }
    let (fmt, offset) = negotiate_decoded(state, requested)?;
    state.decoded = fmt;
    state.colmv_offset = offset;
    Ok(state.decoded.clone())
}

/// Validation half of a control write.
pub(crate) fn try_control(
    state: &SessionState,
    id: ControlId,
    value: &ControlValue,
) -> Result<(), DecodeError> {
    let meta = state.controls.check(id, value)?;
    let desc = state.coded_desc;
    desc.ops.try_ctrl(&state.coded, id, value)?;
    if !meta.format_aware {
        return Ok(());
    }
    let Some(class) = desc.ops.get_image_fmt(id, value) else {
        return Ok(());
    };
    if class == state.image_fmt || desc.is_valid_decoded(state.decoded.fourcc, class) {
        return Ok(());
    }
    if state.destination.is_busy() {
        warn!(?class, "queue is busy");
        return Err(DecodeError::Busy("decoded queue is busy"));
    }
    Ok(())
}

/// Commit half of a control write. The value must have passed [`try_control`].
pub(crate) fn commit_control(state: &mut SessionState, id: ControlId, value: ControlValue) {
    let format_aware = state.controls.meta(id).is_some_and(|m| m.format_aware);
    let class = format_aware
        .then(|| state.coded_desc.ops.get_image_fmt(id, &value))
        .flatten();
    state.controls.store(id, value);
    let Some(class) = class else {
        return;
    };
    if class == state.image_fmt {
        return;
    }
    debug!(from = ?state.image_fmt, to = ?class, "image format class changed");
    state.image_fmt = class;
    if !state.coded_desc.is_valid_decoded(state.decoded.fourcc, class) {
        reset_decoded_format(state);
    }
}

/// Coded format at `index` in enumeration order.
pub fn enum_output_format(index: usize) -> Result<FourCc, DecodeError> {
    coded_formats()
        .get(index)
        .map(|d| d.fourcc)
        .ok_or_else(|| DecodeError::InvalidFormat(format!("no coded format at index {index}")))
}

/// Decoded format at `index` among those valid for the session's class.
pub(crate) fn enum_decoded_format(
    state: &SessionState,
    index: usize,
) -> Result<FourCc, DecodeError> {
    state
        .coded_desc
        .decoded_for(state.image_fmt)
        .nth(index)
        .map(|d| d.fourcc)
        .ok_or_else(|| DecodeError::InvalidFormat(format!("no decoded format at index {index}")))
}

/// Frame sizes accepted for a coded format: one continuous range from 1x1 up to its maximum.
///
/// # Example
/// ```rust
/// use vdec::prelude::*;
///
/// let sizes = enum_framesizes(FourCc::H264_SLICE, 0).unwrap();
/// assert_eq!((sizes.max_width, sizes.max_height), (65520, 65520));
/// assert!(enum_framesizes(FourCc::H264_SLICE, 1).is_err());
/// assert!(enum_framesizes(FourCc::NV12, 0).is_err());
/// ```
pub fn enum_framesizes(fourcc: FourCc, index: usize) -> Result<FrameSizeStepwise, DecodeError> {
    if index != 0 {
        return Err(DecodeError::InvalidFormat(format!(
            "no frame size at index {index}"
        )));
    }
    let desc = find_coded_format(fourcc)
        .ok_or_else(|| DecodeError::InvalidFormat(format!("{fourcc} is not a coded format")))?;
    let max = desc.frmsize;
    Ok(FrameSizeStepwise::new(1, max.max_width, 1, 1, max.max_height, 1))
}
