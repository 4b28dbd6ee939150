//! Opt-in per-stage timing for the head pipeline.
//!
//! Timing is only collected when the `pipeline_metrics` feature is enabled and
//! the target is not WASM (`std::time::Instant` is unavailable there). When
//! disabled, every call compiles down to running the closure.
//!
//! # Usage
//!
//! ```ignore
//! use headgen_engine::geom::{PipelineMetrics, StageBucket};
//!
//! let mut metrics = PipelineMetrics::default();
//! metrics.begin();
//!
//! let frame = metrics.time(StageBucket::Frame, || BoundingFrame::from_landmarks(&set, &cfg));
//!
//! if let Some(report) = metrics.end() {
//!     println!("frame: {} ns", report.frame_ns);
//! }
//! ```

use serde::Serialize;

/// Pipeline stages that can be timed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageBucket {
    /// Bounding frame construction.
    Frame,
    /// Crop, resample and contrast of the face texture.
    Texture,
    /// Skin tone patch sampling.
    SkinTone,
    /// Back-of-head ring and apex synthesis.
    Extension,
    /// Rule-table evaluation for the 52 morph targets.
    MorphTargets,
    /// Blendshape coefficient normalization and backfill.
    Blendshapes,
    /// Final buffer assembly, pose and validation.
    Assembly,
}

/// Cumulative nanoseconds spent in each stage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StageTimingReport {
    pub frame_ns: u64,
    pub texture_ns: u64,
    pub skin_tone_ns: u64,
    pub extension_ns: u64,
    pub morph_targets_ns: u64,
    pub blendshapes_ns: u64,
    pub assembly_ns: u64,
}

impl StageTimingReport {
    /// Returns the total time across all stages in nanoseconds.
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.frame_ns
            .saturating_add(self.texture_ns)
            .saturating_add(self.skin_tone_ns)
            .saturating_add(self.extension_ns)
            .saturating_add(self.morph_targets_ns)
            .saturating_add(self.blendshapes_ns)
            .saturating_add(self.assembly_ns)
    }

    /// Returns the total time in milliseconds (for display purposes).
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    fn slot_mut(&mut self, bucket: StageBucket) -> &mut u64 {
        match bucket {
            StageBucket::Frame => &mut self.frame_ns,
            StageBucket::Texture => &mut self.texture_ns,
            StageBucket::SkinTone => &mut self.skin_tone_ns,
            StageBucket::Extension => &mut self.extension_ns,
            StageBucket::MorphTargets => &mut self.morph_targets_ns,
            StageBucket::Blendshapes => &mut self.blendshapes_ns,
            StageBucket::Assembly => &mut self.assembly_ns,
        }
    }

    /// Adds nanoseconds to a stage, saturating on overflow.
    pub fn add(&mut self, bucket: StageBucket, nanos: u64) {
        let slot = self.slot_mut(bucket);
        *slot = slot.saturating_add(nanos);
    }
}

/// Accumulator for timing pipeline stages.
///
/// When the `pipeline_metrics` feature is disabled (or on WASM), all methods
/// are no-ops and [`end`](Self::end) returns `None`.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    #[cfg(all(feature = "pipeline_metrics", not(target_arch = "wasm32")))]
    report: StageTimingReport,
}

impl PipelineMetrics {
    /// Resets all timing counters to zero.
    pub fn begin(&mut self) {
        #[cfg(all(feature = "pipeline_metrics", not(target_arch = "wasm32")))]
        {
            self.report = StageTimingReport::default();
        }
    }

    /// Returns the accumulated timing report, or `None` if metrics are disabled.
    #[must_use]
    pub fn end(&self) -> Option<StageTimingReport> {
        #[cfg(all(feature = "pipeline_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "pipeline_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    /// Times the execution of `f` and accumulates the elapsed time in `bucket`.
    pub fn time<R>(&mut self, bucket: StageBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "pipeline_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            self.report.add(bucket, nanos);
            result
        }

        #[cfg(not(all(feature = "pipeline_metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }
}
