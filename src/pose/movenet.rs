use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::estimator::{accept_pose, PoseEstimator, PoseModel};
use super::keypoint::{Keypoint, KeypointLayout, Pose};
use super::smooth::Smoothed;
use crate::camera::{Resolution, VideoFrame};
use crate::config::DetectorConfig;
use crate::error::TryOnError;

/// MoveNet の出力順
pub const MOVENET_OUTPUT_NAMES: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// モデル種別ごとの入力サイズ
pub fn input_size_for(variant: &str) -> Option<u32> {
    match variant {
        "lightning" => Some(192),
        "thunder" => Some(256),
        _ => None,
    }
}

/// RgbImage を MoveNet 用の入力テンソルに変換
///
/// - size x size にリサイズ
/// - [1, size, size, 3] の f32 テンソルに変換 (0.0-255.0)
pub fn preprocess_for_movenet(image: &RgbImage, size: u32) -> Array4<f32> {
    let resized = imageops::resize(image, size, size, FilterType::Triangle);
    let n = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, n, n, 3));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, y, x, 0]] = pixel[0] as f32;
        tensor[[0, y, x, 1]] = pixel[1] as f32;
        tensor[[0, y, x, 2]] = pixel[2] as f32;
    }

    tensor
}

/// MoveNet を使用した姿勢検出器
pub struct MoveNetDetector {
    session: Session,
    layout: KeypointLayout,
    input_size: u32,
    min_pose_score: f32,
}

impl MoveNetDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let input_size = input_size_for(&config.model_variant)
            .with_context(|| format!("Unknown model variant '{}'", config.model_variant))?;
        let layout = KeypointLayout::resolve(&MOVENET_OUTPUT_NAMES)?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to load ONNX model {}", config.model_path))?;

        Ok(Self {
            session,
            layout,
            input_size,
            min_pose_score: config.min_pose_score,
        })
    }

    /// 前処理済みテンソルから姿勢を検出し、元映像のピクセル座標で返す
    pub fn detect(&mut self, input: Array4<f32>, frame: Resolution) -> Result<Pose> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // MoveNet の出力は [1, 1, 17, 3] (y, x, score)、座標は 0.0〜1.0
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let w = frame.width as f32;
        let h = frame.height as f32;
        let raw: Vec<Keypoint> = (0..self.layout.len())
            .map(|i| {
                let y = output[[0, 0, i, 0]];
                let x = output[[0, 0, i, 1]];
                let score = output[[0, 0, i, 2]];
                Keypoint::new(x * w, y * h, score)
            })
            .collect();

        Ok(self.layout.assemble(&raw))
    }
}

impl PoseEstimator for MoveNetDetector {
    async fn estimate(&mut self, frame: &VideoFrame) -> Result<Option<Pose>, TryOnError> {
        let resolution = frame.resolution();
        if resolution.width == 0 || resolution.height == 0 {
            return Ok(None);
        }
        let input = preprocess_for_movenet(&frame.image, self.input_size);
        let pose = self
            .detect(input, resolution)
            .map_err(|e| TryOnError::Estimation(format!("{:#}", e)))?;
        Ok(accept_pose(pose, self.min_pose_score))
    }
}

/// MoveNet ONNX モデル
pub struct MoveNetModel;

impl PoseModel for MoveNetModel {
    type Detector = Smoothed<MoveNetDetector>;

    async fn initialize(&self, config: &DetectorConfig) -> Result<Self::Detector, TryOnError> {
        let owned = config.clone();
        let detector = tokio::task::spawn_blocking(move || MoveNetDetector::new(&owned))
            .await
            .map_err(|e| TryOnError::ModelLoad(e.to_string()))?
            .map_err(|e| TryOnError::ModelLoad(format!("{:#}", e)))?;
        log::info!("Model loaded: {} ({})", config.model_path, config.model_variant);
        Ok(Smoothed::new(detector, config.smoothing_alpha()))
    }
}
