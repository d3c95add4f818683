use crate::h264::{H264DecodeParams, H264Pps, H264ScalingMatrix, H264Sps};

/// Strongly typed control identifier.
///
/// # Example
/// ```rust
/// use vdec_core::prelude::ControlId;
///
/// assert_eq!(ControlId::H264_SPS.0, 0x00a4_0902);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlId(pub u32);

const CODEC_BASE: u32 = 0x0099_0900;
const STATELESS_BASE: u32 = 0x00a4_0900;

impl ControlId {
    pub const H264_LEVEL: ControlId = ControlId(CODEC_BASE + 359);
    pub const H264_PROFILE: ControlId = ControlId(CODEC_BASE + 363);
    pub const H264_DECODE_MODE: ControlId = ControlId(STATELESS_BASE);
    pub const H264_START_CODE: ControlId = ControlId(STATELESS_BASE + 1);
    pub const H264_SPS: ControlId = ControlId(STATELESS_BASE + 2);
    pub const H264_PPS: ControlId = ControlId(STATELESS_BASE + 3);
    pub const H264_SCALING_MATRIX: ControlId = ControlId(STATELESS_BASE + 4);
    pub const H264_DECODE_PARAMS: ControlId = ControlId(STATELESS_BASE + 7);
}

/// Control kind/type metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlKind {
    Integer,
    Menu,
    H264Sps,
    H264Pps,
    H264ScalingMatrix,
    H264DecodeParams,
}

impl ControlKind {
    pub fn is_compound(self) -> bool {
        !matches!(self, ControlKind::Integer | ControlKind::Menu)
    }
}

/// Control metadata registered with a control handler.
///
/// Numeric bounds apply to `Integer` and `Menu` controls; menu entries whose
/// bit is set in `menu_skip_mask` are not selectable.
///
/// # Example
/// ```rust
/// use vdec_core::prelude::{ControlId, ControlMeta, ControlValue};
///
/// let meta = ControlMeta::menu(ControlId::H264_PROFILE, "H264 Profile", 1, 9, 2)
///     .skip(1 << 3);
/// assert!(meta.validate(&ControlValue::Int(2)));
/// assert!(!meta.validate(&ControlValue::Int(3)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ControlMeta {
    pub id: ControlId,
    pub name: &'static str,
    pub kind: ControlKind,
    pub min: i64,
    pub max: i64,
    pub step: u64,
    pub default: i64,
    pub menu_skip_mask: u64,
    /// Writes may change the decoded image-format class.
    pub format_aware: bool,
}

impl ControlMeta {
    pub const fn integer(
        id: ControlId,
        name: &'static str,
        min: i64,
        max: i64,
        default: i64,
    ) -> Self {
        Self {
            id,
            name,
            kind: ControlKind::Integer,
            min,
            max,
            step: 1,
            default,
            menu_skip_mask: 0,
            format_aware: false,
        }
    }

    pub const fn menu(
        id: ControlId,
        name: &'static str,
        min: i64,
        max: i64,
        default: i64,
    ) -> Self {
        Self {
            kind: ControlKind::Menu,
            ..Self::integer(id, name, min, max, default)
        }
    }

    pub const fn compound(id: ControlId, name: &'static str, kind: ControlKind) -> Self {
        Self {
            kind,
            ..Self::integer(id, name, 0, 0, 0)
        }
    }

    pub const fn skip(mut self, mask: u64) -> Self {
        self.menu_skip_mask = mask;
        self
    }

    pub const fn format_aware(mut self) -> Self {
        self.format_aware = true;
        self
    }

    /// Value a freshly registered control holds.
    pub fn default_value(&self) -> ControlValue {
        match self.kind {
            ControlKind::Integer | ControlKind::Menu => ControlValue::Int(self.default),
            ControlKind::H264Sps => ControlValue::H264Sps(H264Sps::default()),
            ControlKind::H264Pps => ControlValue::H264Pps(H264Pps::default()),
            ControlKind::H264ScalingMatrix => {
                ControlValue::H264ScalingMatrix(Box::default())
            }
            ControlKind::H264DecodeParams => {
                ControlValue::H264DecodeParams(Box::default())
            }
        }
    }

    /// Range, step, skip-mask and payload-type validation.
    pub fn validate(&self, candidate: &ControlValue) -> bool {
        match (self.kind, candidate) {
            (ControlKind::Integer, ControlValue::Int(v)) => {
                let within = *v >= self.min && *v <= self.max;
                within && (self.step <= 1 || (v - self.min) as u64 % self.step == 0)
            }
            (ControlKind::Menu, ControlValue::Int(v)) => {
                let within = *v >= self.min && *v <= self.max;
                within && (*v >= 64 || self.menu_skip_mask & (1u64 << *v) == 0)
            }
            (ControlKind::H264Sps, ControlValue::H264Sps(_))
            | (ControlKind::H264Pps, ControlValue::H264Pps(_))
            | (ControlKind::H264ScalingMatrix, ControlValue::H264ScalingMatrix(_))
            | (ControlKind::H264DecodeParams, ControlValue::H264DecodeParams(_)) => true,
            _ => false,
        }
    }
}

/// Control value variants.
///
/// # Example
/// ```rust
/// use vdec_core::prelude::ControlValue;
///
/// let v = ControlValue::Int(4);
/// assert_eq!(v.as_int(), Some(4));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    Int(i64),
    H264Sps(H264Sps),
    H264Pps(H264Pps),
    H264ScalingMatrix(Box<H264ScalingMatrix>),
    H264DecodeParams(Box<H264DecodeParams>),
}

impl ControlValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ControlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_h264_sps(&self) -> Option<&H264Sps> {
        match self {
            ControlValue::H264Sps(sps) => Some(sps),
            _ => None,
        }
    }

    pub fn as_h264_pps(&self) -> Option<&H264Pps> {
        match self {
            ControlValue::H264Pps(pps) => Some(pps),
            _ => None,
        }
    }

    pub fn as_h264_decode_params(&self) -> Option<&H264DecodeParams> {
        match self {
            ControlValue::H264DecodeParams(params) => Some(params),
            _ => None,
        }
    }
}
