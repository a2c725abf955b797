//! Resampled-pixel feature encoder.
//!
//! Crops a candidate region, bilinear-resamples it to a canonical
//! 100x100 patch, and emits row-major luma normalized to [0, 1]. Every
//! encoding therefore shares one dimensionality regardless of region
//! size. Pixel similarity, not a learned embedding: match thresholds
//! built on top of this must be calibrated empirically.

use crate::frame::Frame;
use crate::types::{Encoding, Region};

/// Canonical patch edge. Changing this changes encoding dimensionality
/// and orphans previously stored encodings (they are filtered out of
/// matching, not migrated).
pub const ENCODING_SIDE: usize = 100;
pub const ENCODING_DIM: usize = ENCODING_SIDE * ENCODING_SIDE;

const LUMA_RANGE: f32 = 255.0;

#[derive(Debug, Clone, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    /// Encode one region of a frame. Deterministic for identical input.
    ///
    /// The region is clipped to frame bounds first; a region entirely
    /// outside the frame degrades to a single corner pixel rather than
    /// panicking, since localizer output is already bound-checked.
    pub fn extract(&self, frame: &Frame, region: &Region) -> Encoding {
        let region = region
            .clipped_to(frame.width, frame.height)
            .unwrap_or(Region::new(
                region.x.min(frame.width.saturating_sub(1)),
                region.y.min(frame.height.saturating_sub(1)),
                1,
                1,
            ));

        let mut values = Vec::with_capacity(ENCODING_DIM);
        let scale_x = region.width as f32 / ENCODING_SIDE as f32;
        let scale_y = region.height as f32 / ENCODING_SIDE as f32;

        for oy in 0..ENCODING_SIDE {
            let src_y = (oy as f32 + 0.5) * scale_y - 0.5;
            let y0 = (src_y.floor() as i64).clamp(0, region.height as i64 - 1) as u32;
            let y1 = (y0 + 1).min(region.height - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for ox in 0..ENCODING_SIDE {
                let src_x = (ox as f32 + 0.5) * scale_x - 0.5;
                let x0 = (src_x.floor() as i64).clamp(0, region.width as i64 - 1) as u32;
                let x1 = (x0 + 1).min(region.width - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                let tl = frame.pixel(region.x + x0, region.y + y0) as f32;
                let tr = frame.pixel(region.x + x1, region.y + y0) as f32;
                let bl = frame.pixel(region.x + x0, region.y + y1) as f32;
                let br = frame.pixel(region.x + x1, region.y + y1) as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                values.push(val / LUMA_RANGE);
            }
        }

        Encoding::new(values)
    }
}
