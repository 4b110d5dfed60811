use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::align::GarmentTemplate;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub garment: GarmentConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// デバイス番号
    #[serde(default)]
    pub index: i32,
    /// 要求解像度（実際の解像度はデバイス次第）
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    /// カメラ起動のタイムアウト（秒）
    #[serde(default = "default_camera_timeout")]
    pub start_timeout_secs: u64,
}

fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }
fn default_camera_timeout() -> u64 { 10 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
            start_timeout_secs: default_camera_timeout(),
        }
    }
}

impl CameraConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// "lightning" | "thunder"
    #[serde(default = "default_model_variant")]
    pub model_variant: String,
    /// キーポイントのEMA平滑化
    #[serde(default = "default_true")]
    pub smoothing: bool,
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f32,
    /// これ未満の平均信頼度は「人物なし」扱い
    #[serde(default = "default_min_pose_score")]
    pub min_pose_score: f32,
    /// モデル読み込みのタイムアウト（秒）
    #[serde(default = "default_model_timeout")]
    pub load_timeout_secs: u64,
}

fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_model_variant() -> String { "lightning".to_string() }
fn default_true() -> bool { true }
fn default_smoothing_alpha() -> f32 { 0.5 }
fn default_min_pose_score() -> f32 { 0.25 }
fn default_model_timeout() -> u64 { 30 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            model_variant: default_model_variant(),
            smoothing: default_true(),
            smoothing_alpha: default_smoothing_alpha(),
            min_pose_score: default_min_pose_score(),
            load_timeout_secs: default_model_timeout(),
        }
    }
}

impl DetectorConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    /// 平滑化が有効ならEMA係数を返す
    pub fn smoothing_alpha(&self) -> Option<f32> {
        self.smoothing.then_some(self.smoothing_alpha)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GarmentConfig {
    /// base_shirt_{color}.png の置き場所
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    /// GET /products/{id} のレスポンスを保存したJSON
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    /// 空なら商品の最初の色
    #[serde(default)]
    pub default_color: String,
    #[serde(default)]
    pub template: GarmentTemplate,
}

fn default_assets_dir() -> String { "assets".to_string() }
fn default_catalog_path() -> String { "assets/product.json".to_string() }

impl Default for GarmentConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            catalog_path: default_catalog_path(),
            default_color: String::new(),
            template: GarmentTemplate::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    /// 鏡像表示（全レイヤー共通）
    #[serde(default = "default_true")]
    pub mirrored: bool,
    #[serde(default)]
    pub debug_skeleton: bool,
    #[serde(default = "default_skeleton_threshold")]
    pub skeleton_threshold: f32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

fn default_skeleton_threshold() -> f32 { 0.4 }
fn default_frame_rate() -> u32 { 60 }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mirrored: default_true(),
            debug_skeleton: false,
            skeleton_threshold: default_skeleton_threshold(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}; using default configuration", e);
                Self::default()
            }
        }
    }
}
