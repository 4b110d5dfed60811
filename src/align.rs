//! 肩を基準にした衣服の配置
//!
//! 長さはすべて肩幅で正規化する。カメラとの距離が変わっても衣服は体に付いてくる。

use serde::Deserialize;

use crate::pose::{KeypointIndex, Pose};

/// 衣服テンプレートごとの較正値
///
/// 基準値はテンプレートのベース画像で測ったもの。肩幅 `reference_shoulder_distance` px
/// のとき衣服幅は `reference_garment_width` px、肩線から `reference_offset` px 上に置く。
#[derive(Debug, Clone, Deserialize)]
pub struct GarmentTemplate {
    #[serde(default = "default_reference_garment_width")]
    pub reference_garment_width: f32,
    #[serde(default = "default_reference_shoulder_distance")]
    pub reference_shoulder_distance: f32,
    #[serde(default = "default_reference_offset")]
    pub reference_offset: f32,
    #[serde(default = "default_height_to_width")]
    pub garment_height_to_width: f32,
    /// `garment_height_to_width` の代わりに合成画像自身の縦横比を使う
    #[serde(default)]
    pub use_asset_aspect: bool,
    #[serde(default = "default_min_shoulder_score")]
    pub min_shoulder_score: f32,
}

fn default_reference_garment_width() -> f32 { 262.0 }
fn default_reference_shoulder_distance() -> f32 { 190.0 }
fn default_reference_offset() -> f32 { 48.0 }
fn default_height_to_width() -> f32 { 581.0 / 440.0 }
fn default_min_shoulder_score() -> f32 { 0.3 }

impl Default for GarmentTemplate {
    fn default() -> Self {
        Self {
            reference_garment_width: default_reference_garment_width(),
            reference_shoulder_distance: default_reference_shoulder_distance(),
            reference_offset: default_reference_offset(),
            garment_height_to_width: default_height_to_width(),
            use_asset_aspect: false,
            min_shoulder_score: default_min_shoulder_score(),
        }
    }
}

impl GarmentTemplate {
    pub fn width_ratio(&self) -> f32 {
        self.reference_garment_width / self.reference_shoulder_distance
    }

    fn height_to_width(&self, garment_size: (u32, u32)) -> Option<f32> {
        if !self.use_asset_aspect {
            return Some(self.garment_height_to_width);
        }
        let (w, h) = garment_size;
        (w > 0 && h > 0).then(|| h as f32 / w as f32)
    }
}

/// 衣服の画面上の配置（元映像のピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentTransform {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// このフレームで衣服を描く位置を求める
///
/// どちらかの肩が `min_shoulder_score` 未満、または両肩が重なる場合は `None`（描画しない）。
/// `garment_size` は合成画像の大きさ。
pub fn align(
    pose: &Pose,
    garment_size: (u32, u32),
    template: &GarmentTemplate,
) -> Option<AlignmentTransform> {
    let left = pose.get(KeypointIndex::LeftShoulder);
    let right = pose.get(KeypointIndex::RightShoulder);

    if !left.is_valid(template.min_shoulder_score) || !right.is_valid(template.min_shoulder_score) {
        return None;
    }

    let shoulder_distance = (left.x - right.x).abs();
    if !(shoulder_distance > 0.0) || !shoulder_distance.is_finite() {
        return None;
    }
    if !(template.reference_shoulder_distance > 0.0) {
        return None;
    }

    let width = shoulder_distance * template.width_ratio();
    let height = width * template.height_to_width(garment_size)?;
    if !(width > 0.0 && height > 0.0) {
        return None;
    }

    let scale = shoulder_distance / template.reference_shoulder_distance;
    let vertical_offset = template.reference_offset * scale;

    let midpoint_x = (left.x + right.x) / 2.0;
    Some(AlignmentTransform {
        x: midpoint_x - width / 2.0,
        y: right.y - vertical_offset,
        width,
        height,
    })
}
