//! Property tests for frame-size clamping and plane layout arithmetic.

use proptest::prelude::*;
use vdec_core::prelude::*;

fn stepwise() -> impl Strategy<Value = FrameSizeStepwise> {
    (1u32..512, 1u32..128, 1u32..64, 1u32..512, 1u32..128, 1u32..64).prop_map(
        |(min_w, span_w, step_w, min_h, span_h, step_h)| {
            FrameSizeStepwise::new(
                min_w,
                min_w + span_w * step_w + step_w / 2,
                step_w,
                min_h,
                min_h + span_h * step_h + step_h / 2,
                step_h,
            )
        },
    )
}

proptest! {
    /// Constrained geometry stays in range and on the step grid.
    #[test]
    fn constrained_geometry_in_range_and_aligned(
        sizes in stepwise(),
        width in any::<u32>(),
        height in any::<u32>(),
    ) {
        let (w, h) = sizes.constrain(width, height);
        prop_assert!(w >= sizes.min_width && w <= sizes.max_width);
        prop_assert!(h >= sizes.min_height && h <= sizes.max_height);
        prop_assert_eq!((w - sizes.min_width) % sizes.step_width, 0);
        prop_assert_eq!((h - sizes.min_height) % sizes.step_height, 0);
    }

    /// Clamping never shrinks an in-range request.
    #[test]
    fn constrain_only_widens_inside_range(sizes in stepwise(), width in 1u32..4096) {
        let (w, _) = sizes.constrain(width, sizes.min_height);
        let on_grid_max = sizes.constrain(u32::MAX, 0).0;
        if width <= on_grid_max {
            prop_assert!(w >= width);
        }
    }

    /// Constraining twice is the same as constraining once.
    #[test]
    fn constrain_is_idempotent(sizes in stepwise(), width in any::<u32>(), height in any::<u32>()) {
        let once = sizes.constrain(width, height);
        prop_assert_eq!(sizes.constrain(once.0, once.1), once);
    }

    /// Layouts are deterministic and grow monotonically with geometry.
    #[test]
    fn layout_is_deterministic(
        index in 0usize..4,
        width in 1u32..8192,
        height in 1u32..8192,
    ) {
        let fourcc = [FourCc::NV12, FourCc::NV15, FourCc::NV16, FourCc::NV20][index];
        let mut a = PixFormat::new(fourcc, 0, 0);
        let mut b = PixFormat::new(fourcc, 0, 0);
        fill_pixfmt(&mut a, fourcc, width, height).unwrap();
        fill_pixfmt(&mut b, fourcc, width, height).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert!(a.planes[0].sizeimage >= u64::from(width) * u64::from(height));
    }
}
