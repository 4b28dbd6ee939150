//! Explicit run context tying every stage together.
//!
//! [`HeadPipeline`] owns the configuration and the only "current" result.
//! A run either completes and replaces that result, or fails and leaves it
//! untouched.

use std::collections::BTreeMap;
use std::fmt;

use image::RgbaImage;
use serde::Serialize;

use crate::asset::{AssemblyError, AssemblyInput, FaceMeshAsset, assemble_asset};
use crate::config::{ConfigError, HeadConfig};
use crate::face::{
    BlendshapeCoefficients, BoundingFrame, CanonicalTopology, HeuristicCalibration, LandmarkError,
    LandmarkSet, MORPH_RULES, MorphError, SILHOUETTE_CONTOUR, TopologyError, resolve_coefficients,
    synthesize_morph_targets,
};
use crate::geom::{
    ExtensionError, GeomMeshDiagnostics, PipelineMetrics, Point3, StageBucket, synthesize_extension,
};
use crate::texture::{
    ExtractedTexture, SkinToneSample, TextureError, extract_texture, sample_skin_tone,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PipelineError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no result to export, run the pipeline first")]
    NoResult,
    #[error("export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Landmarks(#[from] LandmarkError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Extension(#[from] ExtensionError),
    #[error(transparent)]
    Morph(#[from] MorphError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What the external face detector delivers for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorOutput {
    /// Normalized image-space landmarks; empty when no face was found.
    pub landmarks: Vec<[f64; 3]>,
    /// Blendshape scores by ARKit name. May be partial.
    pub blendshapes: BTreeMap<String, f32>,
    /// Row-major 4x4 head pose.
    pub pose: Option<[f64; 16]>,
}

/// Output of one successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadResult {
    pub asset: FaceMeshAsset,
    pub texture: ExtractedTexture,
    pub coefficients: BlendshapeCoefficients,
    pub skin: SkinToneSample,
    pub frame: BoundingFrame,
    /// Mesh topology plus run warnings and optional stage timing.
    pub diagnostics: GeomMeshDiagnostics,
}

/// Borrowed view of a result handed to an [`AssetEncoder`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExportBundle<'a> {
    pub asset: &'a FaceMeshAsset,
    #[serde(skip)]
    pub texture: &'a ExtractedTexture,
    pub coefficients: &'a BlendshapeCoefficients,
}

/// Seam for binary asset writers (glTF, USDZ, ...).
pub trait AssetEncoder {
    type Output;
    type Error: fmt::Display;

    fn encode(&mut self, bundle: &ExportBundle<'_>) -> Result<Self::Output, Self::Error>;
}

pub struct HeadPipeline {
    config: HeadConfig,
    calibration: HeuristicCalibration,
    topology: CanonicalTopology,
    current: Option<HeadResult>,
}

impl HeadPipeline {
    pub fn new(config: HeadConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            calibration: HeuristicCalibration::default(),
            topology: CanonicalTopology::standard()?,
            current: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HeadConfig {
        &self.config
    }

    /// Replace the configuration for future runs. The current result is kept.
    pub fn set_config(&mut self, config: HeadConfig) -> Result<(), PipelineError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    #[must_use]
    pub fn current(&self) -> Option<&HeadResult> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Process one image. On success the new result becomes current.
    pub fn run(
        &mut self,
        detector: &DetectorOutput,
        image: &RgbaImage,
    ) -> Result<&HeadResult, PipelineError> {
        if detector.landmarks.is_empty() {
            log::info!("no landmarks in detector output, nothing to build");
            return Err(PipelineError::NoFaceDetected);
        }

        match self.build(detector, image) {
            Ok(result) => Ok(self.current.insert(result)),
            Err(err) => {
                log::warn!("head pipeline failed: {err}");
                Err(err)
            }
        }
    }

    fn build(&self, detector: &DetectorOutput, image: &RgbaImage) -> Result<HeadResult, PipelineError> {
        let config = &self.config;
        let mut metrics = PipelineMetrics::default();
        metrics.begin();

        let landmarks = LandmarkSet::new(
            detector.landmarks.iter().copied().map(Point3::from_array).collect(),
        )?;
        log::debug!(
            "processing {}x{} image, {} landmarks",
            image.width(),
            image.height(),
            landmarks.len()
        );

        let (frame, frontal) = metrics.time(StageBucket::Frame, || {
            let frame = BoundingFrame::from_landmarks(&landmarks, &config.frame);
            let frontal = frame.model_positions(&landmarks);
            (frame, frontal)
        });

        let texture = metrics.time(StageBucket::Texture, || {
            extract_texture(image, &frame, &config.texture)
        })?;

        let skin = metrics.time(StageBucket::SkinTone, || {
            sample_skin_tone(&texture.image, &config.skin)
        });

        let extension = metrics.time(StageBucket::Extension, || {
            synthesize_extension(&landmarks, &SILHOUETTE_CONTOUR, &frame, &skin, &config.extension)
        })?;

        let targets = metrics.time(StageBucket::MorphTargets, || {
            let mut base = frontal.clone();
            base.extend_from_slice(&extension.positions);
            synthesize_morph_targets(&base, &MORPH_RULES, &config.morph)
        })?;

        let coefficients = metrics.time(StageBucket::Blendshapes, || {
            resolve_coefficients(&detector.blendshapes, &landmarks, &frame, &self.calibration)
        });

        let asset = metrics.time(StageBucket::Assembly, || {
            let input = AssemblyInput {
                landmarks: &landmarks,
                frontal: &frontal,
                // UVs address the extracted texture, so they use its crop
                crop: &texture.crop,
                topology: &self.topology,
                extension: &extension,
                morph_targets: &targets,
                pose: detector.pose.as_ref(),
            };
            assemble_asset(&input, &config.pose, &config.asset)
        })?;

        let mut diagnostics = asset.diagnostics();
        if skin.fell_back {
            diagnostics.add_warning("skin tone fell back to the default");
        }
        if extension.is_empty() {
            diagnostics.add_warning("silhouette too short, head left open");
        }
        diagnostics.timing = metrics.end();
        log::info!("head built: {}", diagnostics.summary());

        Ok(HeadResult {
            asset,
            texture,
            coefficients,
            skin,
            frame,
            diagnostics,
        })
    }

    /// Hand the current result to `encoder`. Failures leave the result in
    /// place so the export can be retried.
    pub fn export<E: AssetEncoder>(&self, encoder: &mut E) -> Result<E::Output, PipelineError> {
        let result = self.current.as_ref().ok_or(PipelineError::NoResult)?;
        let bundle = ExportBundle {
            asset: &result.asset,
            texture: &result.texture,
            coefficients: &result.coefficients,
        };
        encoder
            .encode(&bundle)
            .map_err(|err| PipelineError::Export(err.to_string()))
    }
}
