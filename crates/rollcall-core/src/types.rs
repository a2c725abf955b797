use serde::{Deserialize, Serialize};

/// Axis-aligned candidate face region in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip this region to a frame of the given dimensions.
    ///
    /// Returns `None` if nothing of the region lies inside the frame.
    pub fn clipped_to(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Region {
            x: self.x,
            y: self.y,
            width,
            height,
        })
    }
}

/// Fixed-length face feature vector with values in [0, 1].
///
/// Dimensionality is set by the encoder that produced it; entries of a
/// different dimensionality are filtered out of matching, never compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another encoding of the same dimensionality.
    pub fn distance(&self, other: &Encoding) -> f32 {
        debug_assert_eq!(self.dim(), other.dim());
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Outcome of matching one query encoding against the enrolled gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Accepted identity, or `None` for "Unknown".
    pub identity: Option<String>,
    /// Distance to the nearest compatible candidate; `+inf` when the
    /// gallery held no compatible candidate at all.
    pub distance: f32,
    /// Diagnostic confidence in [0, 100], reported even on rejection.
    pub confidence: f32,
}

impl MatchOutcome {
    /// Outcome for a gallery with no dimensionally-compatible candidates.
    pub fn unknown() -> Self {
        Self {
            identity: None,
            distance: f32::INFINITY,
            confidence: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for matching a query encoding against enrolled (identity,
/// encoding) pairs.
///
/// The gallery slice is a point-in-time snapshot; implementations must
/// produce the same winner, distance, and tie-break as a linear scan in
/// snapshot order, which leaves room for an indexed substitute on larger
/// enrollment sets.
pub trait Match {
    fn best_match(&self, query: &Encoding, gallery: &[(String, Encoding)]) -> MatchOutcome;
}

/// Linear-scan nearest-neighbor matcher over Euclidean distance.
///
/// Ties break to the first-seen gallery entry. A candidate is accepted
/// as identified only below `threshold`; both `threshold` and
/// `confidence_scale` are empirical calibration for the pixel encoder.
#[derive(Debug, Clone)]
pub struct NearestMatcher {
    /// Accept a candidate only when its distance is strictly below this.
    pub threshold: f32,
    /// Confidence slope K in `clamp(100 - distance * K, 0, 100)`.
    pub confidence_scale: f32,
}

pub const DEFAULT_MATCH_THRESHOLD: f32 = 1000.0;
pub const DEFAULT_CONFIDENCE_SCALE: f32 = 2.0;

impl Default for NearestMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            confidence_scale: DEFAULT_CONFIDENCE_SCALE,
        }
    }
}

impl NearestMatcher {
    pub fn new(threshold: f32, confidence_scale: f32) -> Self {
        Self {
            threshold,
            confidence_scale,
        }
    }

    fn confidence(&self, distance: f32) -> f32 {
        (100.0 - distance * self.confidence_scale).clamp(0.0, 100.0)
    }
}

/// Filter a gallery snapshot down to entries comparable with `query_dim`.
///
/// Mismatched dimensionality (legacy entries from a changed encoder) is
/// an explicit skip stage, not an error inside the distance loop.
pub fn compatible_candidates(
    query_dim: usize,
    gallery: &[(String, Encoding)],
) -> impl Iterator<Item = &(String, Encoding)> {
    gallery.iter().filter(move |(_, enc)| enc.dim() == query_dim)
}

impl Match for NearestMatcher {
    fn best_match(&self, query: &Encoding, gallery: &[(String, Encoding)]) -> MatchOutcome {
        let mut best: Option<(&str, f32)> = None;

        for (name, enc) in compatible_candidates(query.dim(), gallery) {
            let dist = query.distance(enc);
            // Strict less-than keeps the first-seen entry on ties.
            let better = match best {
                None => true,
                Some((_, best_dist)) => dist < best_dist,
            };
            if better {
                best = Some((name.as_str(), dist));
            }
        }

        match best {
            None => MatchOutcome::unknown(),
            Some((name, distance)) => {
                let confidence = self.confidence(distance);
                let identity = if distance < self.threshold {
                    Some(name.to_string())
                } else {
                    None
                };
                MatchOutcome {
                    identity,
                    distance,
                    confidence,
                }
            }
        }
    }
}
