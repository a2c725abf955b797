//! Engine facade: wires the vision pipeline to the durable stores.
//!
//! Owns all shared mutable state (encoding store, session gate, ledger)
//! behind one injected object, so the locking discipline is testable and
//! no module-level globals exist. One call runs to completion
//! synchronously; there are no background threads.

use chrono::NaiveDateTime;
use rollcall_core::{
    DetectorConfig, FaceLocator, FeatureEncoder, Frame, Localize, Match, MatchOutcome,
    NearestMatcher, Region,
};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::ledger::Ledger;
use crate::session::{SessionGate, SessionState};
use crate::store::EncodingStore;

/// Per-region diagnostic result from [`Engine::scan`].
#[derive(Debug, Clone)]
pub struct FaceScan {
    pub region: Region,
    pub outcome: MatchOutcome,
}

pub struct Engine {
    localizer: Box<dyn Localize + Send + Sync>,
    encoder: FeatureEncoder,
    matcher: Box<dyn Match + Send + Sync>,
    store: EncodingStore,
    ledger: Ledger,
    session: SessionGate,
}

impl Engine {
    /// Build an engine from configuration, opening the durable stores.
    pub fn new(config: &Config) -> Result<Self> {
        let localizer = FaceLocator::new(DetectorConfig {
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_face_size: config.min_face_size,
        });
        let matcher = NearestMatcher::new(config.match_threshold, config.confidence_scale);
        Ok(Self::with_parts(
            Box::new(localizer),
            Box::new(matcher),
            EncodingStore::open(&config.store_path),
            Ledger::open(&config.db_path, config.bucket_secs)?,
        ))
    }

    /// Assemble an engine from explicit parts. Dependency seam for tests
    /// and for substituting the localizer or matcher.
    pub fn with_parts(
        localizer: Box<dyn Localize + Send + Sync>,
        matcher: Box<dyn Match + Send + Sync>,
        store: EncodingStore,
        ledger: Ledger,
    ) -> Self {
        Self {
            localizer,
            encoder: FeatureEncoder,
            matcher,
            store,
            ledger,
            session: SessionGate::new(),
        }
    }

    /// Enroll an identity from a decoded frame.
    ///
    /// Requires exactly one face in the frame. On any failure the
    /// encoding store is untouched.
    pub fn enroll(&self, identity: &str, frame: &Frame, details: Option<&str>) -> Result<()> {
        if identity.is_empty() {
            return Err(EngineError::EmptyIdentity);
        }

        let regions = self.localizer.locate(frame);
        let region = match regions.as_slice() {
            [] => return Err(EngineError::NoFace),
            [one] => one,
            many => return Err(EngineError::AmbiguousFace(many.len())),
        };

        let encoding = self.encoder.extract(frame, region);
        self.store.put(identity, encoding)?;
        self.ledger.upsert_student(identity, details)?;
        tracing::info!(identity, ?region, "identity enrolled");
        Ok(())
    }

    /// Enroll from encoded image bytes.
    pub fn enroll_image(&self, identity: &str, bytes: &[u8], details: Option<&str>) -> Result<()> {
        let frame = Frame::decode(bytes)?;
        self.enroll(identity, &frame, details)
    }

    /// Recognize enrolled identities in a frame and record presence,
    /// stamping records with the current local time.
    pub fn recognize(&self, frame: &Frame) -> Result<Vec<String>> {
        self.recognize_at(frame, chrono::Local::now().naive_local())
    }

    /// Recognize with an explicit timestamp.
    ///
    /// Returns identified identities only; Unknown outcomes are filtered.
    /// While the session is Idle nothing reaches the ledger and the list
    /// is empty. Zero faces is a normal empty result, never an error.
    pub fn recognize_at(&self, frame: &Frame, ts: NaiveDateTime) -> Result<Vec<String>> {
        if !self.session.is_active() {
            tracing::debug!("recognition while session idle, nothing recorded");
            return Ok(Vec::new());
        }

        let gallery = self.store.all();
        let mut identified = Vec::new();

        for region in self.localizer.locate(frame) {
            let encoding = self.encoder.extract(frame, &region);
            let outcome = self.matcher.best_match(&encoding, &gallery);
            tracing::debug!(
                ?region,
                identity = outcome.identity.as_deref().unwrap_or("Unknown"),
                distance = outcome.distance,
                confidence = outcome.confidence,
                "face matched"
            );
            if let Some(identity) = outcome.identity {
                self.ledger.record_if_new(&identity, ts)?;
                identified.push(identity);
            }
        }

        Ok(identified)
    }

    /// Recognize from encoded image bytes.
    pub fn recognize_image(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let frame = Frame::decode(bytes)?;
        self.recognize(&frame)
    }

    /// Diagnostic pass: full per-region outcomes, session-independent,
    /// never recorded. Usable while Idle.
    pub fn scan(&self, frame: &Frame) -> Vec<FaceScan> {
        let gallery = self.store.all();
        self.localizer
            .locate(frame)
            .into_iter()
            .map(|region| {
                let encoding = self.encoder.extract(frame, &region);
                FaceScan {
                    region,
                    outcome: self.matcher.best_match(&encoding, &gallery),
                }
            })
            .collect()
    }

    pub fn scan_image(&self, bytes: &[u8]) -> Result<Vec<FaceScan>> {
        let frame = Frame::decode(bytes)?;
        Ok(self.scan(&frame))
    }

    pub fn start_session(&self) {
        self.session.start();
    }

    pub fn stop_session(&self) {
        self.session.stop();
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Rename an enrolled identity, cascading through the directory and
    /// the attendance ledger.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        if new.is_empty() {
            return Err(EngineError::EmptyIdentity);
        }
        self.store.rename(old, new)?;
        self.ledger.rename_identity(old, new)?;
        tracing::info!(old, new, "identity renamed");
        Ok(())
    }

    /// Remove an identity's enrollment. Attendance history is retained.
    pub fn remove(&self, identity: &str) -> Result<()> {
        self.store.remove(identity)
    }

    /// Enrolled identities.
    pub fn roster(&self) -> Vec<String> {
        self.store.names()
    }

    pub fn store(&self) -> &EncodingStore {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_blob_path() -> PathBuf {
        let seq = TEST_SEQ.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "rollcall-engine-test-{}-{}",
            std::process::id(),
            seq
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("encodings.json")
    }

    /// Localizer stub returning a fixed region list for any frame.
    struct FixedRegions(Vec<Region>);

    impl Localize for FixedRegions {
        fn locate(&self, _frame: &Frame) -> Vec<Region> {
            self.0.clone()
        }
    }

    fn gradient_frame() -> Frame {
        let data = (0..64u32 * 64).map(|i| (i % 251) as u8).collect();
        Frame::from_raw(data, 64, 64).unwrap()
    }

    fn engine_with(regions: Vec<Region>, matcher: NearestMatcher) -> Engine {
        Engine::with_parts(
            Box::new(FixedRegions(regions)),
            Box::new(matcher),
            EncodingStore::open(temp_blob_path()),
            Ledger::open_in_memory(60).unwrap(),
        )
    }

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    const FACE: Region = Region {
        x: 4,
        y: 4,
        width: 32,
        height: 32,
    };

    #[test]
    fn test_enroll_then_recognize_same_region() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        let frame = gradient_frame();
        engine.enroll("alice", &frame, Some("grade 10")).unwrap();

        engine.start_session();
        let identified = engine.recognize_at(&frame, ts(9, 0, 0)).unwrap();
        assert_eq!(identified, vec!["alice"]);

        // Identical source region: exact match.
        let scans = engine.scan(&frame);
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].outcome.distance, 0.0);
        assert_eq!(scans[0].outcome.confidence, 100.0);
    }

    #[test]
    fn test_idle_session_records_nothing() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        let frame = gradient_frame();
        engine.enroll("alice", &frame, None).unwrap();

        for _ in 0..10 {
            assert!(engine.recognize_at(&frame, ts(9, 0, 0)).unwrap().is_empty());
        }
        assert!(engine.ledger().recent(10).unwrap().is_empty());

        engine.start_session();
        engine.recognize_at(&frame, ts(9, 0, 30)).unwrap();
        assert_eq!(engine.ledger().recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_bucket_dedup_across_recognitions() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        let frame = gradient_frame();
        engine.enroll("alice", &frame, None).unwrap();
        engine.start_session();

        engine.recognize_at(&frame, ts(9, 0, 5)).unwrap();
        engine.recognize_at(&frame, ts(9, 0, 45)).unwrap();
        assert_eq!(engine.ledger().recent(10).unwrap().len(), 1);

        engine.recognize_at(&frame, ts(9, 1, 5)).unwrap();
        assert_eq!(engine.ledger().recent(10).unwrap().len(), 2);
    }

    #[test]
    fn test_enroll_requires_exactly_one_face() {
        let frame = gradient_frame();

        let engine = engine_with(vec![], NearestMatcher::default());
        assert!(matches!(
            engine.enroll("alice", &frame, None),
            Err(EngineError::NoFace)
        ));

        let two = vec![FACE, Region::new(30, 30, 20, 20)];
        let engine = engine_with(two, NearestMatcher::default());
        let before = engine.store().all();
        assert!(matches!(
            engine.enroll("alice", &frame, None),
            Err(EngineError::AmbiguousFace(2))
        ));
        assert_eq!(engine.store().all(), before);
    }

    #[test]
    fn test_empty_identity_rejected() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        assert!(matches!(
            engine.enroll("", &gradient_frame(), None),
            Err(EngineError::EmptyIdentity)
        ));
    }

    #[test]
    fn test_no_face_recognition_is_empty_not_error() {
        let engine = engine_with(vec![], NearestMatcher::default());
        engine.start_session();
        assert!(engine
            .recognize_at(&gradient_frame(), ts(9, 0, 0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_filtered_and_unrecorded() {
        // Impossibly tight threshold: every candidate is rejected.
        let engine = engine_with(vec![FACE], NearestMatcher::new(1e-9, 2.0));
        let frame = gradient_frame();
        engine.enroll("alice", &frame, None).unwrap();
        engine.start_session();

        // Query region differs from the enrolled one, so distance > 0.
        let other = Frame::from_raw(vec![7u8; 64 * 64], 64, 64).unwrap();
        assert!(engine.recognize_at(&other, ts(9, 0, 0)).unwrap().is_empty());
        assert!(engine.ledger().recent(10).unwrap().is_empty());

        // Diagnostics still expose the rejected outcome.
        let scans = engine.scan(&other);
        assert_eq!(scans[0].outcome.identity, None);
        assert!(scans[0].outcome.distance > 0.0);
    }

    #[test]
    fn test_rename_flows_through_matching() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        let frame = gradient_frame();
        engine.enroll("alice", &frame, Some("grade 10")).unwrap();

        engine.rename("alice", "alicia").unwrap();

        let scans = engine.scan(&frame);
        assert_eq!(scans[0].outcome.identity.as_deref(), Some("alicia"));
        assert_eq!(engine.roster(), vec!["alicia"]);
        assert_eq!(engine.ledger().students().unwrap()[0].name, "alicia");
    }

    #[test]
    fn test_enroll_upserts_directory() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        engine
            .enroll("alice", &gradient_frame(), Some("grade 10"))
            .unwrap();
        let students = engine.ledger().students().unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].details, "grade 10");
    }

    #[test]
    fn test_scan_runs_while_idle_without_recording() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        let frame = gradient_frame();
        engine.enroll("alice", &frame, None).unwrap();

        assert_eq!(engine.session_state(), SessionState::Idle);
        let scans = engine.scan(&frame);
        assert_eq!(scans[0].outcome.identity.as_deref(), Some("alice"));
        assert!(engine.ledger().recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_undecodable_bytes_fail_with_decode() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        assert!(matches!(
            engine.enroll_image("alice", &[1, 2, 3], None),
            Err(EngineError::Decode(_))
        ));
        assert!(matches!(
            engine.recognize_image(&[1, 2, 3]),
            Err(EngineError::Decode(_))
        ));
    }

    #[test]
    fn test_remove_keeps_history() {
        let engine = engine_with(vec![FACE], NearestMatcher::default());
        let frame = gradient_frame();
        engine.enroll("alice", &frame, None).unwrap();
        engine.start_session();
        engine.recognize_at(&frame, ts(9, 0, 0)).unwrap();

        engine.remove("alice").unwrap();
        assert!(engine.roster().is_empty());
        assert_eq!(engine.ledger().history("alice").unwrap().len(), 1);
    }
}
