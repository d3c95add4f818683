//! Register map of the decoder block.

/// Writing 1 starts decoding of the programmed picture.
pub const REG_DEC_E: u32 = 0x028;
pub const DEC_E_START: u32 = 1;

pub const REG_IMPORTANT_EN: u32 = 0x02c;
/// Masks every decoder interrupt.
pub const DEC_IRQ_DISABLE: u32 = 1 << 4;

/// Hardware-side timeout, in core clock cycles.
pub const REG_TIMEOUT_THRESHOLD: u32 = 0x050;
pub const TIMEOUT_THRESHOLD_CYCLES: u32 = 0x00ff_ffff;

/// Coded picture size in macroblocks, `(mb_w - 1) | (mb_h - 1) << 16`.
pub const REG_PIC_SIZE: u32 = 0x060;
pub const REG_Y_STRIDE: u32 = 0x064;
pub const REG_UV_STRIDE: u32 = 0x068;

pub const REG_STRM_BASE: u32 = 0x100;
pub const REG_STRM_LEN: u32 = 0x104;
pub const REG_DST_BASE: u32 = 0x108;
pub const REG_COLMV_BASE: u32 = 0x10c;
pub const REG_TABLE_BASE: u32 = 0x110;

/// First of sixteen reference picture base registers.
pub const REG_REF_BASE: u32 = 0x140;

/// First of ten `(address, size)` scratch-buffer register pairs.
pub const REG_RCB_BASE: u32 = 0x200;

pub const REG_STA_INT: u32 = 0x380;
pub const STA_INT_DEC_RDY_STA: u32 = 1 << 2;
pub const STA_INT_ERROR: u32 = 1 << 3;
pub const STA_INT_SOFTRESET_RDY: u32 = 1 << 9;

/// Address register of scratch buffer `index`; the size register follows it.
pub const fn rcb_addr_reg(index: usize) -> u32 {
    REG_RCB_BASE + (index as u32) * 8
}

pub const fn rcb_size_reg(index: usize) -> u32 {
    rcb_addr_reg(index) + 4
}

pub const fn ref_base_reg(index: usize) -> u32 {
    REG_REF_BASE + (index as u32) * 4
}
