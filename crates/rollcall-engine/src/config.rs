//! Engine configuration.
//!
//! Defaults, overridden by an optional TOML file, overridden by
//! `ROLLCALL_*` environment variables. The matching constants are
//! calibration for the resized-pixel encoder; swapping the encoder means
//! re-tuning them, they carry no meaning of their own.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the encoding store blob.
    pub store_path: PathBuf,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Accept a candidate only below this Euclidean distance.
    pub match_threshold: f32,
    /// Confidence slope K in `clamp(100 - distance * K, 0, 100)`.
    pub confidence_scale: f32,
    /// Dedup bucket granularity in seconds (60 = per minute, 86400 = per day).
    pub bucket_secs: u32,
    /// Detector downsampling ratio between passes.
    pub scale_factor: f32,
    /// Overlapping detections required to accept a face region.
    pub min_neighbors: usize,
    /// Smallest face edge scanned, in pixels.
    pub min_face_size: u32,
}

/// Optional on-disk overrides; every field may be omitted.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    store_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    match_threshold: Option<f32>,
    confidence_scale: Option<f32>,
    bucket_secs: Option<u32>,
    scale_factor: Option<f32>,
    min_neighbors: Option<usize>,
    min_face_size: Option<u32>,
}

impl Config {
    /// Resolve configuration: defaults <- TOML file <- environment.
    pub fn load() -> Self {
        let data_dir = default_data_dir();
        let mut config = Self {
            store_path: data_dir.join("encodings.json"),
            db_path: data_dir.join("attendance.db"),
            match_threshold: 1000.0,
            confidence_scale: 2.0,
            bucket_secs: 60,
            scale_factor: 1.1,
            min_neighbors: 3,
            min_face_size: 24,
        };

        let file_path = std::env::var("ROLLCALL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("rollcall.toml"));
        config.apply_file(&file_path);
        config.apply_env();
        config
    }

    fn apply_file(&mut self, path: &std::path::Path) {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return,
        };
        let file: FileConfig = match toml::from_str(&text) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "config file unparseable, ignoring");
                return;
            }
        };
        tracing::info!(path = %path.display(), "config file loaded");

        if let Some(v) = file.store_path {
            self.store_path = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.match_threshold {
            self.match_threshold = v;
        }
        if let Some(v) = file.confidence_scale {
            self.confidence_scale = v;
        }
        if let Some(v) = file.bucket_secs {
            self.bucket_secs = v;
        }
        if let Some(v) = file.scale_factor {
            self.scale_factor = v;
        }
        if let Some(v) = file.min_neighbors {
            self.min_neighbors = v;
        }
        if let Some(v) = file.min_face_size {
            self.min_face_size = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ROLLCALL_STORE_PATH") {
            self.store_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        self.match_threshold = env_f32("ROLLCALL_MATCH_THRESHOLD", self.match_threshold);
        self.confidence_scale = env_f32("ROLLCALL_CONFIDENCE_SCALE", self.confidence_scale);
        self.bucket_secs = env_u32("ROLLCALL_BUCKET_SECS", self.bucket_secs);
        self.scale_factor = env_f32("ROLLCALL_SCALE_FACTOR", self.scale_factor);
        self.min_neighbors = env_usize("ROLLCALL_MIN_NEIGHBORS", self.min_neighbors);
        self.min_face_size = env_u32("ROLLCALL_MIN_FACE_SIZE", self.min_face_size);
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
