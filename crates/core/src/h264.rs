//! Stateless H.264 parameter payloads carried by compound controls.

/// `max_num_ref_frames`-sized decoded picture buffer.
pub const DPB_ENTRIES: usize = 16;

/// Sequence parameter set, as parsed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H264Sps {
    pub profile_idc: u8,
    pub constraint_set_flags: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub log2_max_frame_num_minus4: u8,
    pub pic_order_cnt_type: u8,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub max_num_ref_frames: u8,
    pub pic_width_in_mbs_minus1: u16,
    pub pic_height_in_map_units_minus1: u16,
    pub flags: u32,
}

impl H264Sps {
    pub const FLAG_SEPARATE_COLOUR_PLANE: u32 = 0x01;
    pub const FLAG_QPPRIME_Y_ZERO_TRANSFORM_BYPASS: u32 = 0x02;
    pub const FLAG_DELTA_PIC_ORDER_ALWAYS_ZERO: u32 = 0x04;
    pub const FLAG_GAPS_IN_FRAME_NUM_VALUE_ALLOWED: u32 = 0x08;
    pub const FLAG_FRAME_MBS_ONLY: u32 = 0x10;
    pub const FLAG_MB_ADAPTIVE_FRAME_FIELD: u32 = 0x20;
    pub const FLAG_DIRECT_8X8_INFERENCE: u32 = 0x40;

    pub fn frame_mbs_only(&self) -> bool {
        self.flags & Self::FLAG_FRAME_MBS_ONLY != 0
    }

    /// Coded picture width in luma samples.
    pub fn width(&self) -> u32 {
        (u32::from(self.pic_width_in_mbs_minus1) + 1) * 16
    }

    /// Coded frame height in luma samples; map units are field pairs unless `frame_mbs_only`.
    pub fn height(&self) -> u32 {
        let map_units = (u32::from(self.pic_height_in_map_units_minus1) + 1) * 16;
        if self.frame_mbs_only() {
            map_units
        } else {
            map_units * 2
        }
    }
}

impl Default for H264Sps {
    // 4:2:0 is the only chroma format every profile supports.
    fn default() -> Self {
        Self {
            profile_idc: 0,
            constraint_set_flags: 0,
            level_idc: 0,
            seq_parameter_set_id: 0,
            chroma_format_idc: 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            log2_max_frame_num_minus4: 0,
            pic_order_cnt_type: 0,
            log2_max_pic_order_cnt_lsb_minus4: 0,
            max_num_ref_frames: 0,
            pic_width_in_mbs_minus1: 0,
            pic_height_in_map_units_minus1: 0,
            flags: 0,
        }
    }
}

/// Picture parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct H264Pps {
    pub pic_parameter_set_id: u8,
    pub seq_parameter_set_id: u8,
    pub num_slice_groups_minus1: u8,
    pub num_ref_idx_l0_default_active_minus1: u8,
    pub num_ref_idx_l1_default_active_minus1: u8,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i8,
    pub pic_init_qs_minus26: i8,
    pub chroma_qp_index_offset: i8,
    pub second_chroma_qp_index_offset: i8,
    pub flags: u16,
}

/// Quantization scaling lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H264ScalingMatrix {
    pub scaling_list_4x4: [[u8; 16]; 6],
    pub scaling_list_8x8: [[u8; 64]; 6],
}

impl Default for H264ScalingMatrix {
    fn default() -> Self {
        Self {
            scaling_list_4x4: [[16; 16]; 6],
            scaling_list_8x8: [[16; 64]; 6],
        }
    }
}

/// One entry of the decoded picture buffer, referencing a previously decoded
/// capture buffer by its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct H264DpbEntry {
    pub reference_ts: u64,
    pub pic_num: u32,
    pub frame_num: u16,
    pub fields: u8,
    pub top_field_order_cnt: i32,
    pub bottom_field_order_cnt: i32,
    pub flags: u32,
}

impl H264DpbEntry {
    pub const FLAG_VALID: u32 = 0x01;
    pub const FLAG_ACTIVE: u32 = 0x02;
    pub const FLAG_LONG_TERM: u32 = 0x04;
    pub const FLAG_FIELD: u32 = 0x08;

    pub fn is_active(&self) -> bool {
        self.flags & Self::FLAG_ACTIVE != 0
    }
}

/// Per-picture decode parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct H264DecodeParams {
    pub dpb: [H264DpbEntry; DPB_ENTRIES],
    pub nal_ref_idc: u16,
    pub frame_num: u16,
    pub top_field_order_cnt: i32,
    pub bottom_field_order_cnt: i32,
    pub idr_pic_id: u16,
    pub flags: u32,
}

impl H264DecodeParams {
    pub const FLAG_IDR_PIC: u32 = 0x01;
    pub const FLAG_FIELD_PIC: u32 = 0x02;
    pub const FLAG_BOTTOM_FIELD: u32 = 0x04;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sps_geometry_doubles_for_field_coding() {
        let mut sps = H264Sps {
            pic_width_in_mbs_minus1: 119,
            pic_height_in_map_units_minus1: 67,
            flags: H264Sps::FLAG_FRAME_MBS_ONLY,
            ..H264Sps::default()
        };
        assert_eq!((sps.width(), sps.height()), (1920, 1088));
        sps.flags = 0;
        assert_eq!(sps.height(), 2176);
    }
}
