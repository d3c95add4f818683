use std::{fmt, str::FromStr};

use smallvec::SmallVec;

/// Four-character code describing a pixel or bitstream format.
///
/// # Example
/// ```rust
/// use vdec_core::prelude::FourCc;
///
/// let fcc = FourCc::new(*b"S264");
/// assert_eq!(fcc.to_string(), "S264");
/// assert_eq!(fcc, FourCc::H264_SLICE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// H.264 parsed slice data (stateless decoding input).
    pub const H264_SLICE: FourCc = FourCc::new(*b"S264");
    /// Y/CbCr 4:2:0, 8 bit, two planes (luma + interleaved chroma).
    pub const NV12: FourCc = FourCc::new(*b"NV12");
    /// Y/CbCr 4:2:0, 10 bit packed, two planes.
    pub const NV15: FourCc = FourCc::new(*b"NV15");
    /// Y/CbCr 4:2:2, 8 bit, two planes.
    pub const NV16: FourCc = FourCc::new(*b"NV16");
    /// Y/CbCr 4:2:2, 10 bit packed, two planes.
    pub const NV20: FourCc = FourCc::new(*b"NV20");

    /// Construct from raw bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Little-endian u32 encoding.
    pub fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Try to convert to a printable string.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<u32> for FourCc {
    fn from(value: u32) -> Self {
        Self(value.to_le_bytes())
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.as_str() {
            write!(f, "{s}")
        } else {
            write!(f, "0x{:08x}", self.to_u32())
        }
    }
}

impl FromStr for FourCc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err("fourcc must be four ASCII bytes".into());
        }
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(FourCc(arr))
    }
}

/// Abstract chroma-subsampling and bit-depth category of decoded pictures.
///
/// `Any` is a wildcard: it matches every concrete class, in either position.
///
/// # Example
/// ```rust
/// use vdec_core::prelude::ImageFormatClass;
///
/// assert!(ImageFormatClass::Any.matches(ImageFormatClass::Yuv422_10));
/// assert!(ImageFormatClass::Yuv420_8.matches(ImageFormatClass::Any));
/// assert!(!ImageFormatClass::Yuv420_8.matches(ImageFormatClass::Yuv420_10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImageFormatClass {
    #[default]
    Any,
    Yuv420_8,
    Yuv420_10,
    Yuv422_8,
    Yuv422_10,
}

impl ImageFormatClass {
    /// Wildcard-aware comparison.
    pub fn matches(self, other: ImageFormatClass) -> bool {
        self == ImageFormatClass::Any || other == ImageFormatClass::Any || self == other
    }
}

/// Field order of a picture. Stateless decoders only produce progressive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Field {
    #[default]
    Any,
    None,
    Top,
    Bottom,
    Interlaced,
}

/// Color primaries family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorSpace {
    #[default]
    Default,
    Smpte170m,
    Rec709,
    Srgb,
    Bt2020,
}

/// Transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferFunction {
    #[default]
    Default,
    Rec709,
    Srgb,
    Smpte2084,
}

/// Y'CbCr encoding matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum YcbcrEncoding {
    #[default]
    Default,
    Bt601,
    Rec709,
    Bt2020,
}

/// Quantization range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Quantization {
    #[default]
    Default,
    FullRange,
    LimitedRange,
}

/// Colorimetry carried alongside a pixel format.
///
/// The decoder never converts color; it only echoes what the bitstream side
/// negotiated onto the decoded side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Colorimetry {
    pub colorspace: ColorSpace,
    pub xfer_func: TransferFunction,
    pub ycbcr_enc: YcbcrEncoding,
    pub quantization: Quantization,
}

impl Colorimetry {
    /// Colorimetry a freshly reset format carries: Rec.709 primaries, everything else default.
    pub const fn rec709() -> Self {
        Self {
            colorspace: ColorSpace::Rec709,
            xfer_func: TransferFunction::Default,
            ycbcr_enc: YcbcrEncoding::Default,
            quantization: Quantization::Default,
        }
    }
}

/// Stepwise frame-size description (min/max/step per axis).
///
/// # Example
/// ```rust
/// use vdec_core::prelude::FrameSizeStepwise;
///
/// let sizes = FrameSizeStepwise::new(64, 65520, 64, 16, 65520, 16);
/// assert_eq!(sizes.constrain(1920, 1080), (1920, 1088));
/// assert_eq!(sizes.constrain(1, 1), (64, 16));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameSizeStepwise {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl FrameSizeStepwise {
    pub const fn new(
        min_width: u32,
        max_width: u32,
        step_width: u32,
        min_height: u32,
        max_height: u32,
        step_height: u32,
    ) -> Self {
        Self {
            min_width,
            max_width,
            step_width,
            min_height,
            max_height,
            step_height,
        }
    }

    /// Clamp a geometry into range and align it up to the step grid.
    ///
    /// The result is always on the `min + k * step` grid and never exceeds the
    /// maximum; when the maximum itself is off-grid, the largest on-grid value
    /// below it is used.
    pub fn constrain(&self, width: u32, height: u32) -> (u32, u32) {
        (
            clamp_roundup(width, self.min_width, self.max_width, self.step_width),
            clamp_roundup(height, self.min_height, self.max_height, self.step_height),
        )
    }

    /// Whether a geometry is already on the constraint grid.
    pub fn contains(&self, width: u32, height: u32) -> bool {
        self.constrain(width, height) == (width, height)
    }
}

fn clamp_roundup(value: u32, min: u32, max: u32, step: u32) -> u32 {
    let value = value.clamp(min, max);
    if step <= 1 {
        return value;
    }
    let offset = (value - min).div_ceil(step) * step;
    if offset > max - min {
        min + ((max - min) / step) * step
    } else {
        min + offset
    }
}

/// Size of one memory plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaneFormat {
    /// Bytes per line of the first component plane stored in this memory plane.
    pub bytesperline: u32,
    /// Total bytes the plane needs.
    pub sizeimage: u64,
}

/// Multi-planar pixel format: code, geometry, colorimetry and memory planes.
///
/// # Example
/// ```rust
/// use vdec_core::prelude::{FourCc, PixFormat};
///
/// let fmt = PixFormat::new(FourCc::NV12, 1920, 1088);
/// assert_eq!(fmt.num_planes(), 0);
/// assert_eq!(fmt.fourcc.to_string(), "NV12");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixFormat {
    #[cfg_attr(feature = "serde", serde(with = "fourcc_str"))]
    pub fourcc: FourCc,
    pub width: u32,
    pub height: u32,
    pub field: Field,
    pub colorimetry: Colorimetry,
    pub planes: SmallVec<[PlaneFormat; 3]>,
}

impl PixFormat {
    /// Format with the given code and geometry, no planes and default colorimetry.
    pub fn new(fourcc: FourCc, width: u32, height: u32) -> Self {
        Self {
            fourcc,
            width,
            height,
            field: Field::Any,
            colorimetry: Colorimetry::default(),
            planes: SmallVec::new(),
        }
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    /// Size of memory plane `index`, zero when absent.
    pub fn plane_size(&self, index: usize) -> u64 {
        self.planes.get(index).map(|p| p.sizeimage).unwrap_or(0)
    }
}

#[cfg(feature = "serde")]
mod fourcc_str {
    use super::FourCc;
    use std::str::FromStr;

    pub fn serialize<S>(value: &FourCc, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Prefer string encoding so decoding does not rely on `deserialize_any`.
        serializer.serialize_str(value.as_str().unwrap_or("FFFF"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<FourCc, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <std::borrow::Cow<'de, str> as serde::Deserialize>::deserialize(deserializer)?;
        FourCc::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H264: FrameSizeStepwise = FrameSizeStepwise::new(64, 65520, 64, 16, 65520, 16);

    #[test]
    fn constrain_rounds_up_to_step() {
        assert_eq!(H264.constrain(1920, 1080), (1920, 1088));
        assert_eq!(H264.constrain(65, 17), (128, 32));
    }

    #[test]
    fn constrain_never_leaves_range() {
        let (w, h) = H264.constrain(u32::MAX, u32::MAX);
        assert!(w <= H264.max_width && h <= H264.max_height);
        assert_eq!((w - H264.min_width) % H264.step_width, 0);
        assert_eq!(h, 65520);
        assert_eq!(w, 65472);
    }

    #[test]
    fn wildcard_class_matching() {
        assert!(ImageFormatClass::Any.matches(ImageFormatClass::Any));
        assert!(ImageFormatClass::Yuv422_8.matches(ImageFormatClass::Yuv422_8));
        assert!(!ImageFormatClass::Yuv422_8.matches(ImageFormatClass::Yuv420_8));
    }

    #[test]
    fn fourcc_parse_and_display() {
        let parsed: FourCc = "NV20".parse().expect("fourcc");
        assert_eq!(parsed, FourCc::NV20);
        assert!("NV2".parse::<FourCc>().is_err());
        assert_eq!(FourCc::from(0x3231_564e).to_string(), "NV12");
    }
}
