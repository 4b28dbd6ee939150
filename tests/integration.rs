use std::collections::BTreeMap;

use headgen_engine::HeadEngine;
use headgen_engine::config::HeadConfig;
use headgen_engine::face::{ArkitChannel, LandmarkSet};
use headgen_engine::geom::Point3;
use headgen_engine::pipeline::{
    AssetEncoder, DetectorOutput, ExportBundle, HeadPipeline, PipelineError,
};
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn config() -> HeadConfig {
    let mut config = HeadConfig::default();
    config.texture.resolution = 96;
    config
}

fn frame_image() -> RgbaImage {
    RgbaImage::from_fn(320, 240, |x, y| {
        Rgba([180 + (x % 40) as u8, 140 + (y % 30) as u8, 110, 255])
    })
}

fn detector(points: &[Point3]) -> DetectorOutput {
    DetectorOutput {
        landmarks: points.iter().map(|p| p.to_array()).collect(),
        ..DetectorOutput::default()
    }
}

fn reference_points() -> Vec<Point3> {
    LandmarkSet::reference().points().to_vec()
}

fn shifted(points: &[Point3], indices: &[usize], dx: f64, dy: f64) -> Vec<Point3> {
    points
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            if indices.contains(&i) {
                Point3::new(p.x + dx, p.y + dy, p.z)
            } else {
                p
            }
        })
        .collect()
}

struct Collect;

impl AssetEncoder for Collect {
    type Output = (usize, usize);
    type Error = String;

    fn encode(&mut self, bundle: &ExportBundle<'_>) -> Result<Self::Output, Self::Error> {
        Ok((bundle.asset.vertex_count(), bundle.texture.image.as_raw().len()))
    }
}

struct DiskFull;

impl AssetEncoder for DiskFull {
    type Output = ();
    type Error = &'static str;

    fn encode(&mut self, _bundle: &ExportBundle<'_>) -> Result<(), &'static str> {
        Err("disk full")
    }
}

#[test]
fn engine_initializes() {
    let engine = HeadEngine::new();
    assert!(engine.is_initialized());
    assert!(engine.pipeline().is_some_and(|p| p.current().is_none()));
}

#[test]
fn reference_face_builds_a_closed_head() {
    let mut pipeline = HeadPipeline::new(config()).expect("default config is valid");
    let result = pipeline
        .run(&detector(&reference_points()), &frame_image())
        .expect("reference face builds");

    let asset = &result.asset;
    assert_eq!(asset.frontal_vertex_count(), 81);
    assert_eq!(asset.morph_targets().len(), 52);
    assert!(result.diagnostics.is_closed_solid(), "{}", result.diagnostics);
    assert!(!result.diagnostics.has_warnings());
    assert_eq!(result.coefficients.iter().count(), 52);
}

#[test]
fn runs_are_deterministic() {
    let image = frame_image();
    let input = detector(&reference_points());

    let mut first = HeadPipeline::new(config()).unwrap();
    let mut second = HeadPipeline::new(config()).unwrap();
    let a = first.run(&input, &image).unwrap().clone();
    let b = second.run(&input, &image).unwrap();

    assert_eq!(a.asset.positions(), b.asset.positions());
    assert_eq!(a.asset.uvs(), b.asset.uvs());
    assert_eq!(a.asset.indices(), b.asset.indices());
    assert_eq!(a.texture, b.texture);
}

#[test]
fn no_face_leaves_the_previous_result() {
    let mut pipeline = HeadPipeline::new(config()).unwrap();
    let before = pipeline
        .run(&detector(&reference_points()), &frame_image())
        .unwrap()
        .clone();

    let err = pipeline.run(&DetectorOutput::default(), &frame_image());
    assert_eq!(err.err(), Some(PipelineError::NoFaceDetected));
    assert_eq!(pipeline.current(), Some(&before));
}

#[test]
fn failed_run_leaves_the_previous_result() {
    let mut pipeline = HeadPipeline::new(config()).unwrap();
    let before = pipeline
        .run(&detector(&reference_points()), &frame_image())
        .unwrap()
        .clone();

    let mut short = reference_points();
    short.pop();
    assert!(matches!(
        pipeline.run(&detector(&short), &frame_image()),
        Err(PipelineError::Landmarks(_))
    ));

    let empty_image = RgbaImage::new(0, 0);
    assert!(matches!(
        pipeline.run(&detector(&reference_points()), &empty_image),
        Err(PipelineError::Texture(_))
    ));

    assert_eq!(pipeline.current(), Some(&before));
}

#[test]
fn export_failure_keeps_the_result_exportable() {
    let mut pipeline = HeadPipeline::new(config()).unwrap();
    pipeline
        .run(&detector(&reference_points()), &frame_image())
        .unwrap();

    assert_eq!(
        pipeline.export(&mut DiskFull),
        Err(PipelineError::Export("disk full".to_string()))
    );
    let (vertices, texture_bytes) = pipeline.export(&mut Collect).unwrap();
    assert_eq!(vertices, pipeline.current().unwrap().asset.vertex_count());
    assert_eq!(texture_bytes, 96 * 96 * 4);
}

#[test]
fn open_jaw_is_backfilled_and_blends_down() {
    let lowered = [6, 7, 8, 9, 10, 55, 56, 57, 58, 59, 65, 66, 67];
    let points = shifted(&reference_points(), &lowered, 0.0, 0.08);
    let mut input = detector(&points);
    input.blendshapes = BTreeMap::from([
        ("jawOpen".to_string(), 0.0),
        ("eyeBlinkLeft".to_string(), 0.3),
    ]);

    let mut pipeline = HeadPipeline::new(config()).unwrap();
    let result = pipeline.run(&input, &frame_image()).unwrap();
    let jaw_open = result.coefficients.get(ArkitChannel::JawOpen);
    assert!(jaw_open > 0.0);
    assert_eq!(result.coefficients.get(ArkitChannel::EyeBlinkLeft), 0.3);

    let blended = result.asset.blend(&result.coefficients);
    let chin = 8;
    assert!(blended[chin][1] < result.asset.positions()[chin][1]);
    assert_eq!(blended[81..], result.asset.positions()[81..]);
}

#[test]
fn wider_mouth_never_lowers_smile_scores() {
    let mut pipeline = HeadPipeline::new(config()).unwrap();
    let image = frame_image();
    let base = pipeline
        .run(&detector(&reference_points()), &image)
        .unwrap()
        .coefficients
        .clone();

    let mut previous = (
        base.get(ArkitChannel::MouthSmileLeft),
        base.get(ArkitChannel::MouthSmileRight),
    );
    for step in 1..=6 {
        let widen = 0.01 * f64::from(step);
        let points = shifted(&reference_points(), &[54], widen, 0.0);
        let points = shifted(&points, &[48], -widen, 0.0);
        let coefficients = &pipeline.run(&detector(&points), &image).unwrap().coefficients;
        let current = (
            coefficients.get(ArkitChannel::MouthSmileLeft),
            coefficients.get(ArkitChannel::MouthSmileRight),
        );
        assert!(current.0 >= previous.0 && current.1 >= previous.1, "step {step}");
        previous = current;
    }
    assert!(previous.0 > 0.0 && previous.1 > 0.0);

    // corners at 0.32 and 0.68 in the reference, twice as far apart here
    let doubled = shifted(&reference_points(), &[54], 0.18, 0.0);
    let doubled = shifted(&doubled, &[48], -0.18, 0.0);
    let coefficients = &pipeline.run(&detector(&doubled), &image).unwrap().coefficients;
    for (channel, baseline) in [
        (ArkitChannel::MouthSmileLeft, base.get(ArkitChannel::MouthSmileLeft)),
        (ArkitChannel::MouthSmileRight, base.get(ArkitChannel::MouthSmileRight)),
    ] {
        let score = coefficients.get(channel);
        assert!(score >= baseline, "{channel}: {score} < {baseline}");
        assert!(score <= 1.0, "{channel}: {score}");
    }
}

#[test]
fn pose_rotates_the_whole_head_rigidly() {
    let image = frame_image();
    let plain_input = detector(&reference_points());
    let mut posed_input = plain_input.clone();
    let (sin, cos) = 0.4f64.sin_cos();
    #[rustfmt::skip]
    let pose = [
        1.0, 0.0, 0.0, 0.0,
        0.0, cos, -sin, 0.0,
        0.0, sin, cos, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ];
    posed_input.pose = Some(pose);

    let mut pipeline = HeadPipeline::new(config()).unwrap();
    let plain = pipeline.run(&plain_input, &image).unwrap().clone();
    let posed = pipeline.run(&posed_input, &image).unwrap();

    let length = |p: [f32; 3]| {
        (f64::from(p[0]).powi(2) + f64::from(p[1]).powi(2) + f64::from(p[2]).powi(2)).sqrt()
    };
    for (a, b) in plain.asset.positions().iter().zip(posed.asset.positions()) {
        assert!((length(*a) - length(*b)).abs() < 1e-5);
    }
    assert_ne!(plain.asset.positions(), posed.asset.positions());
    assert_eq!(plain.asset.uvs(), posed.asset.uvs());
    assert!(posed.diagnostics.is_closed_solid());
}

#[test]
fn transparent_frame_falls_back_to_default_skin() {
    let mut pipeline = HeadPipeline::new(config()).unwrap();
    let clear = RgbaImage::from_pixel(320, 240, Rgba([0, 0, 0, 0]));
    let result = pipeline.run(&detector(&reference_points()), &clear).unwrap();

    assert!(result.skin.fell_back);
    assert_eq!(
        result.skin.to_array(),
        HeadConfig::default().skin.default_tone
    );
    assert!(result.diagnostics.has_warnings());
    assert!(result.diagnostics.is_closed_solid());
}

#[test]
fn jittered_detections_stay_closed() {
    let mut rng = StdRng::seed_from_u64(81);
    let image = frame_image();
    let mut pipeline = HeadPipeline::new(config()).unwrap();

    for _ in 0..12 {
        let points: Vec<Point3> = reference_points()
            .into_iter()
            .map(|p| {
                Point3::new(
                    p.x + rng.random_range(-0.005..0.005),
                    p.y + rng.random_range(-0.005..0.005),
                    p.z + rng.random_range(-0.01..0.01),
                )
            })
            .collect();
        let mut input = detector(&points);
        input.blendshapes.insert("mouthSmileLeft".to_string(), rng.random_range(0.0..1.5));

        let result = pipeline.run(&input, &image).unwrap();
        assert!(result.diagnostics.is_watertight(), "{}", result.diagnostics);
        assert!(result.diagnostics.is_consistently_oriented());
        assert!(
            result
                .coefficients
                .iter()
                .all(|(_, v)| (0.0..=1.0).contains(&v))
        );
    }
}
