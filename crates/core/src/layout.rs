//! Plane layout arithmetic for the semi-planar YUV formats the decoder writes.
use smallvec::smallvec;

use crate::format::{FourCc, PixFormat, PlaneFormat};

/// Errors produced while computing plane layouts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("no layout known for {0}")]
    UnknownFormat(FourCc),
    #[error("invalid geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },
}

/// Packing description of a pixel format.
///
/// Component plane `i` uses `bpp[i] / bpp_div[i]` bytes per sample group and is
/// aligned to `block_w[i]` x `block_h[i]` pixels. Chroma planes are subsampled
/// by `hdiv` x `vdiv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelInfo {
    pub fourcc: FourCc,
    pub comp_planes: u8,
    pub bpp: [u8; 2],
    pub bpp_div: [u8; 2],
    pub block_w: [u8; 2],
    pub block_h: [u8; 2],
    pub hdiv: u8,
    pub vdiv: u8,
}

impl PixelInfo {
    const fn semi_planar(fourcc: FourCc, ten_bit: bool, vdiv: u8) -> Self {
        if ten_bit {
            Self {
                fourcc,
                comp_planes: 2,
                bpp: [5, 10],
                bpp_div: [4, 4],
                block_w: [4, 2],
                block_h: [1, 1],
                hdiv: 2,
                vdiv,
            }
        } else {
            Self {
                fourcc,
                comp_planes: 2,
                bpp: [1, 2],
                bpp_div: [1, 1],
                block_w: [1, 1],
                block_h: [1, 1],
                hdiv: 2,
                vdiv,
            }
        }
    }
}

const PIXEL_INFO: [PixelInfo; 4] = [
    PixelInfo::semi_planar(FourCc::NV12, false, 2),
    PixelInfo::semi_planar(FourCc::NV15, true, 2),
    PixelInfo::semi_planar(FourCc::NV16, false, 1),
    PixelInfo::semi_planar(FourCc::NV20, true, 1),
];

/// Look up the packing of a decoded pixel format.
pub fn pixel_info(fourcc: FourCc) -> Option<&'static PixelInfo> {
    PIXEL_INFO.iter().find(|info| info.fourcc == fourcc)
}

/// Fill `fmt` with a single contiguous memory plane holding every component plane.
///
/// # Example
/// ```rust
/// use vdec_core::prelude::{fill_pixfmt, FourCc, PixFormat};
///
/// let mut fmt = PixFormat::new(FourCc::NV12, 0, 0);
/// fill_pixfmt(&mut fmt, FourCc::NV12, 64, 16).unwrap();
/// assert_eq!(fmt.planes[0].bytesperline, 64);
/// assert_eq!(fmt.planes[0].sizeimage, 64 * 16 * 3 / 2);
/// ```
pub fn fill_pixfmt(
    fmt: &mut PixFormat,
    fourcc: FourCc,
    width: u32,
    height: u32,
) -> Result<(), LayoutError> {
    let info = pixel_info(fourcc).ok_or(LayoutError::UnknownFormat(fourcc))?;
    if width == 0 || height == 0 {
        return Err(LayoutError::InvalidGeometry { width, height });
    }

    let width = u64::from(width);
    let height = u64::from(height);
    let bytesperline =
        width.next_multiple_of(u64::from(info.block_w[0])) * u64::from(info.bpp[0])
            / u64::from(info.bpp_div[0]);

    let mut sizeimage = 0u64;
    for i in 0..usize::from(info.comp_planes) {
        let (hdiv, vdiv) = if i == 0 {
            (1, 1)
        } else {
            (u64::from(info.hdiv), u64::from(info.vdiv))
        };
        let aligned_w = width.next_multiple_of(u64::from(info.block_w[i]));
        let aligned_h = height.next_multiple_of(u64::from(info.block_h[i]));
        sizeimage += u64::from(info.bpp[i]) * aligned_w.div_ceil(hdiv) * aligned_h.div_ceil(vdiv)
            / u64::from(info.bpp_div[i]);
    }

    fmt.fourcc = fourcc;
    fmt.width = width as u32;
    fmt.height = height as u32;
    fmt.planes = smallvec![PlaneFormat {
        bytesperline: u32::try_from(bytesperline).unwrap_or(u32::MAX),
        sizeimage,
    }];
    Ok(())
}
