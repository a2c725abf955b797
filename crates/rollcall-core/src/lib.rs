//! rollcall-core — Face localization and recognition matching engine.
//!
//! A deliberately model-free pipeline: a multi-scale contrast detector
//! finds candidate face regions, a resampled-pixel encoder turns each
//! region into a fixed-length vector, and a nearest-neighbor matcher
//! scores it against the enrolled gallery. Thresholds are calibration
//! parameters for this extractor, not universal constants.

pub mod detector;
pub mod encoder;
pub mod frame;
pub mod types;

pub use detector::{DetectorConfig, FaceLocator, Localize};
pub use encoder::{FeatureEncoder, ENCODING_DIM, ENCODING_SIDE};
pub use frame::{Frame, FrameError};
pub use types::{Encoding, Match, MatchOutcome, NearestMatcher, Region};
