//! Multi-scale sliding-window face localizer.
//!
//! Model-free stand-in for a cascade detector: scans windows over an
//! integral image, keeps windows whose band contrast looks face-like
//! (eye band darker than cheek band, non-trivial variance), then votes
//! overlapping raw hits into accepted regions. Deterministic for
//! identical input, which is what the pipeline's tests rely on.

use crate::frame::Frame;
use crate::types::Region;

// --- Named constants (no magic numbers) ---
const BASE_WINDOW: u32 = 24;
const DEFAULT_SCALE_FACTOR: f32 = 1.1;
const DEFAULT_MIN_NEIGHBORS: usize = 3;
/// Windows flatter than this (pixel-value variance) carry no structure.
const VARIANCE_FLOOR: f64 = 150.0;
/// Required mean-luma gap between the cheek band and the eye band.
const EYE_CHEEK_CONTRAST: f64 = 12.0;
/// Raw hits within this fraction of the window size are the same face.
const GROUP_EPS: f32 = 0.2;
/// Eye band spans rows [0.20, 0.45) of the window, cheeks [0.55, 0.80).
const EYE_BAND: (f32, f32) = (0.20, 0.45);
const CHEEK_BAND: (f32, f32) = (0.55, 0.80);
const BAND_X: (f32, f32) = (0.15, 0.85);

/// Detection parameters.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Downsampling ratio between detection passes (> 1.0).
    pub scale_factor: f32,
    /// Overlapping raw detections required to accept a region.
    pub min_neighbors: usize,
    /// Smallest window edge, in pixels, that will be scanned.
    pub min_face_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_face_size: BASE_WINDOW,
        }
    }
}

/// Face localization seam; lets tests and alternative detectors slot in.
pub trait Localize {
    /// Locate candidate face regions. Finite, possibly empty, stable for
    /// identical input. Overlapping duplicates are allowed; downstream
    /// matching tolerates them.
    fn locate(&self, frame: &Frame) -> Vec<Region>;
}

/// Default sliding-window localizer.
pub struct FaceLocator {
    config: DetectorConfig,
}

impl FaceLocator {
    pub fn new(config: DetectorConfig) -> Self {
        let mut config = config;
        if config.scale_factor < 1.01 {
            tracing::warn!(
                scale_factor = config.scale_factor,
                "scale_factor below 1.01, clamping"
            );
            config.scale_factor = DEFAULT_SCALE_FACTOR;
        }
        config.min_face_size = config.min_face_size.max(8);
        Self { config }
    }
}

impl Default for FaceLocator {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl Localize for FaceLocator {
    fn locate(&self, frame: &Frame) -> Vec<Region> {
        let min_side = frame.width.min(frame.height);
        if min_side < self.config.min_face_size {
            return Vec::new();
        }

        let integral = IntegralImage::build(frame);
        let mut raw = Vec::new();

        let mut size = self.config.min_face_size as f32;
        while size.round() as u32 <= min_side {
            let window = size.round() as u32;
            scan_scale(&integral, window, &mut raw);
            size *= self.config.scale_factor;
        }

        tracing::debug!(
            raw_hits = raw.len(),
            width = frame.width,
            height = frame.height,
            "localizer scan complete"
        );

        group_hits(raw, self.config.min_neighbors, frame.width, frame.height)
    }
}

/// Scan one window size across the frame, collecting face-like windows.
fn scan_scale(integral: &IntegralImage, window: u32, raw: &mut Vec<Region>) {
    let step = (window / 8).max(2);
    let max_y = integral.height - window;
    let max_x = integral.width - window;

    let mut y = 0;
    while y <= max_y {
        let mut x = 0;
        while x <= max_x {
            if window_is_face_like(integral, x, y, window) {
                raw.push(Region::new(x, y, window, window));
            }
            x += step;
        }
        y += step;
    }
}

/// Band-contrast test: enough variance, and eyes darker than cheeks.
fn window_is_face_like(integral: &IntegralImage, x: u32, y: u32, window: u32) -> bool {
    let (_, variance) = integral.mean_variance(x, y, window, window);
    if variance < VARIANCE_FLOOR {
        return false;
    }

    let band = |range: (f32, f32)| -> f64 {
        let y0 = y + (range.0 * window as f32) as u32;
        let y1 = y + (range.1 * window as f32) as u32;
        let x0 = x + (BAND_X.0 * window as f32) as u32;
        let x1 = x + (BAND_X.1 * window as f32) as u32;
        integral.mean(x0, y0, x1 - x0, y1 - y0)
    };

    let eyes = band(EYE_BAND);
    let cheeks = band(CHEEK_BAND);
    cheeks - eyes >= EYE_CHEEK_CONTRAST
}

/// Vote overlapping raw hits into accepted regions.
///
/// A raw hit joins the first group whose seed it overlaps within
/// `GROUP_EPS`; groups smaller than `min_neighbors` are dropped and the
/// survivors are averaged. Mirrors cascade-detector neighbor semantics:
/// `min_neighbors <= 1` accepts every group.
fn group_hits(
    raw: Vec<Region>,
    min_neighbors: usize,
    frame_width: u32,
    frame_height: u32,
) -> Vec<Region> {
    struct Group {
        seed: Region,
        sum_x: u64,
        sum_y: u64,
        sum_size: u64,
        count: usize,
    }

    let mut groups: Vec<Group> = Vec::new();
    for hit in raw {
        match groups.iter_mut().find(|g| similar(&g.seed, &hit)) {
            Some(g) => {
                g.sum_x += hit.x as u64;
                g.sum_y += hit.y as u64;
                g.sum_size += hit.width as u64;
                g.count += 1;
            }
            None => groups.push(Group {
                seed: hit,
                sum_x: hit.x as u64,
                sum_y: hit.y as u64,
                sum_size: hit.width as u64,
                count: 1,
            }),
        }
    }

    let mut accepted: Vec<(usize, Region)> = groups
        .into_iter()
        .filter(|g| g.count >= min_neighbors.max(1))
        .map(|g| {
            let n = g.count as u64;
            let region = Region::new(
                (g.sum_x / n) as u32,
                (g.sum_y / n) as u32,
                (g.sum_size / n) as u32,
                (g.sum_size / n) as u32,
            );
            (g.count, region)
        })
        .collect();

    // Strongest vote first; position breaks ties so output order is stable.
    accepted.sort_by_key(|(count, r)| (std::cmp::Reverse(*count), r.y, r.x));

    accepted
        .into_iter()
        .filter_map(|(_, r)| r.clipped_to(frame_width, frame_height))
        .collect()
}

fn similar(a: &Region, b: &Region) -> bool {
    let eps = (GROUP_EPS * a.width.min(b.width) as f32) as i64;
    (a.x as i64 - b.x as i64).abs() <= eps
        && (a.y as i64 - b.y as i64).abs() <= eps
        && (a.width as i64 - b.width as i64).abs() <= eps
}

/// Summed-area tables for O(1) window sums and variances.
struct IntegralImage {
    width: u32,
    height: u32,
    /// (width + 1) * (height + 1), row-major, row/column 0 zeroed.
    sums: Vec<i64>,
    squares: Vec<i64>,
}

impl IntegralImage {
    fn build(frame: &Frame) -> Self {
        let w = frame.width as usize;
        let h = frame.height as usize;
        let stride = w + 1;
        let mut sums = vec![0i64; stride * (h + 1)];
        let mut squares = vec![0i64; stride * (h + 1)];

        for y in 0..h {
            let mut row_sum = 0i64;
            let mut row_sq = 0i64;
            for x in 0..w {
                let p = frame.data[y * w + x] as i64;
                row_sum += p;
                row_sq += p * p;
                sums[(y + 1) * stride + (x + 1)] = sums[y * stride + (x + 1)] + row_sum;
                squares[(y + 1) * stride + (x + 1)] = squares[y * stride + (x + 1)] + row_sq;
            }
        }

        Self {
            width: frame.width,
            height: frame.height,
            sums,
            squares,
        }
    }

    fn rect_sum(table: &[i64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> i64 {
        let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
        table[(y + h) * stride + (x + w)] + table[y * stride + x]
            - table[y * stride + (x + w)]
            - table[(y + h) * stride + x]
    }

    fn mean(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        if w == 0 || h == 0 {
            return 0.0;
        }
        let stride = self.width as usize + 1;
        let sum = Self::rect_sum(&self.sums, stride, x, y, w, h);
        sum as f64 / (w as f64 * h as f64)
    }

    fn mean_variance(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        if w == 0 || h == 0 {
            return (0.0, 0.0);
        }
        let stride = self.width as usize + 1;
        let n = w as f64 * h as f64;
        let sum = Self::rect_sum(&self.sums, stride, x, y, w, h) as f64;
        let sq = Self::rect_sum(&self.squares, stride, x, y, w, h) as f64;
        let mean = sum / n;
        (mean, (sq / n - mean * mean).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_raw(vec![value; (width * height) as usize], width, height).unwrap()
    }

    fn paint(frame: &mut Frame, x0: u32, y0: u32, w: u32, h: u32, value: u8) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                frame.data[(y * frame.width + x) as usize] = value;
            }
        }
    }

    /// 96x96 frame with one bright face-sized square carrying a dark eye band.
    fn synthetic_face_frame() -> (Frame, Region) {
        let mut frame = uniform_frame(96, 96, 90);
        let face = Region::new(24, 24, 48, 48);
        paint(&mut frame, face.x, face.y, face.width, face.height, 190);
        // Eye band at rows [0.20, 0.45) and cols [0.15, 0.85) of the face.
        paint(&mut frame, face.x + 7, face.y + 10, 34, 11, 60);
        (frame, face)
    }

    fn overlaps(a: &Region, b: &Region) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    #[test]
    fn test_uniform_frame_has_no_faces() {
        let frame = uniform_frame(128, 128, 128);
        assert!(FaceLocator::default().locate(&frame).is_empty());
    }

    #[test]
    fn test_too_small_frame_is_empty_not_error() {
        let frame = uniform_frame(10, 10, 50);
        assert!(FaceLocator::default().locate(&frame).is_empty());
    }

    #[test]
    fn test_synthetic_face_is_found() {
        let (frame, face) = synthetic_face_frame();
        let regions = FaceLocator::default().locate(&frame);
        assert!(!regions.is_empty(), "expected at least one detection");
        assert!(
            regions.iter().any(|r| overlaps(r, &face)),
            "no detection overlaps the painted face: {regions:?}"
        );
    }

    #[test]
    fn test_locate_is_deterministic() {
        let (frame, _) = synthetic_face_frame();
        let locator = FaceLocator::default();
        assert_eq!(locator.locate(&frame), locator.locate(&frame));
    }

    #[test]
    fn test_unreachable_neighbor_count_rejects_everything() {
        let (frame, _) = synthetic_face_frame();
        let locator = FaceLocator::new(DetectorConfig {
            min_neighbors: 100_000,
            ..DetectorConfig::default()
        });
        assert!(locator.locate(&frame).is_empty());
    }

    #[test]
    fn test_integral_image_window_stats() {
        let frame = uniform_frame(16, 16, 10);
        let integral = IntegralImage::build(&frame);
        let (mean, variance) = integral.mean_variance(2, 3, 8, 8);
        assert!((mean - 10.0).abs() < 1e-9);
        assert!(variance.abs() < 1e-9);
        assert!((integral.mean(0, 0, 16, 16) - 10.0).abs() < 1e-9);
    }
}
