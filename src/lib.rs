#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod asset;
pub mod config;
pub mod face;
pub mod geom;
pub mod pipeline;
pub mod texture;

use std::collections::BTreeMap;
use std::fmt;

use config::HeadConfig;
use face::CropRect;
use geom::GeomMeshDiagnostics;
use pipeline::{DetectorOutput, HeadPipeline, HeadResult};
use serde::Serialize;
use texture::SkinToneSample;
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            // no panic hook without the feature
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {
    // logging stays off unless debug_logs is enabled
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    mesh: &'a GeomMeshDiagnostics,
    skin: &'a SkinToneSample,
    crop: &'a CropRect,
    texture_size: u32,
}

impl<'a> From<&'a HeadResult> for RunReport<'a> {
    fn from(result: &'a HeadResult) -> Self {
        Self {
            mesh: &result.diagnostics,
            skin: &result.skin,
            crop: &result.texture.crop,
            texture_size: result.texture.image.width(),
        }
    }
}

/// JS entry point: one head pipeline plus its current result.
#[wasm_bindgen]
pub struct HeadEngine {
    pipeline: Option<HeadPipeline>,
}

impl Default for HeadEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl HeadEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> HeadEngine {
        let pipeline = match HeadPipeline::new(HeadConfig::default()) {
            Ok(pipeline) => Some(pipeline),
            Err(err) => {
                log::error!("head pipeline could not be created: {err}");
                None
            }
        };
        HeadEngine { pipeline }
    }

    #[wasm_bindgen]
    pub fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Replace the configuration with a (partial) JS config object.
    #[wasm_bindgen]
    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsValue> {
        let config: HeadConfig = serde_wasm_bindgen::from_value(config).map_err(to_js_error)?;
        self.pipeline_mut()?.set_config(config).map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn get_config(&self) -> Result<JsValue, JsValue> {
        to_js_value(self.pipeline_ref()?.config())
    }

    /// Build a head from flat landmarks (`[x0, y0, z0, ...]`), a name->score
    /// blendshape object, an optional 16-entry row-major pose and a raw RGBA
    /// frame. Returns the run diagnostics.
    #[wasm_bindgen]
    pub fn process(
        &mut self,
        landmarks: Vec<f32>,
        blendshapes: JsValue,
        pose: Option<Vec<f64>>,
        width: u32,
        height: u32,
        rgba: Vec<u8>,
    ) -> Result<JsValue, JsValue> {
        let image = texture::rgba_from_raw(width, height, rgba).map_err(to_js_error)?;
        self.process_image(&landmarks, blendshapes, pose, &image)
    }

    /// Same as [`process`](Self::process) for a PNG or JPEG encoded frame.
    #[wasm_bindgen]
    pub fn process_encoded(
        &mut self,
        landmarks: Vec<f32>,
        blendshapes: JsValue,
        pose: Option<Vec<f64>>,
        encoded: &[u8],
    ) -> Result<JsValue, JsValue> {
        let image = texture::decode_image(encoded).map_err(to_js_error)?;
        self.process_image(&landmarks, blendshapes, pose, &image)
    }

    #[wasm_bindgen]
    pub fn get_asset(&self) -> Result<JsValue, JsValue> {
        to_js_value(&self.current()?.asset)
    }

    #[wasm_bindgen]
    pub fn get_blendshapes(&self) -> Result<JsValue, JsValue> {
        to_js_value(&self.current()?.coefficients)
    }

    /// Square RGBA8 face texture; its side is `get_diagnostics().textureSize`.
    #[wasm_bindgen]
    pub fn get_texture_rgba(&self) -> Result<Vec<u8>, JsValue> {
        Ok(self.current()?.texture.image.as_raw().clone())
    }

    #[wasm_bindgen]
    pub fn get_diagnostics(&self) -> Result<JsValue, JsValue> {
        to_js_value(&RunReport::from(self.current()?))
    }

    #[wasm_bindgen]
    pub fn clear(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.clear();
        }
    }
}

impl HeadEngine {
    /// The underlying pipeline, for native callers.
    #[must_use]
    pub fn pipeline(&self) -> Option<&HeadPipeline> {
        self.pipeline.as_ref()
    }

    fn pipeline_ref(&self) -> Result<&HeadPipeline, JsValue> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| js_error("head engine is not initialized"))
    }

    fn pipeline_mut(&mut self) -> Result<&mut HeadPipeline, JsValue> {
        self.pipeline
            .as_mut()
            .ok_or_else(|| js_error("head engine is not initialized"))
    }

    fn current(&self) -> Result<&HeadResult, JsValue> {
        self.pipeline_ref()?
            .current()
            .ok_or_else(|| js_error("no head has been processed yet"))
    }

    fn process_image(
        &mut self,
        landmarks: &[f32],
        blendshapes: JsValue,
        pose: Option<Vec<f64>>,
        image: &image::RgbaImage,
    ) -> Result<JsValue, JsValue> {
        let detector = detector_output(landmarks, blendshapes, pose)?;
        let result = self
            .pipeline_mut()?
            .run(&detector, image)
            .map_err(to_js_error)?;
        to_js_value(&RunReport::from(result))
    }
}

fn detector_output(
    landmarks: &[f32],
    blendshapes: JsValue,
    pose: Option<Vec<f64>>,
) -> Result<DetectorOutput, JsValue> {
    if landmarks.len() % 3 != 0 {
        return Err(js_error(&format!(
            "landmark buffer length {} is not a multiple of 3",
            landmarks.len()
        )));
    }
    let landmarks = landmarks
        .chunks_exact(3)
        .map(|c| [f64::from(c[0]), f64::from(c[1]), f64::from(c[2])])
        .collect();

    let blendshapes: BTreeMap<String, f32> = if blendshapes.is_undefined() || blendshapes.is_null() {
        BTreeMap::new()
    } else {
        serde_wasm_bindgen::from_value(blendshapes).map_err(to_js_error)?
    };

    let pose = match pose {
        None => None,
        Some(values) => Some(<[f64; 16]>::try_from(values.as_slice()).map_err(|_| {
            js_error(&format!("pose needs 16 values, got {}", values.len()))
        })?),
    };

    Ok(DetectorOutput {
        landmarks,
        blendshapes,
        pose,
    })
}

fn to_js_value<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|err| JsError::new(&err.to_string()).into())
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        log::debug!("{message}");
        JsValue::NULL
    }
}
