use anyhow::Result;
use image::RgbaImage;

use super::canvas::Canvas;
use super::skeleton::draw_skeleton;
use crate::align::AlignmentTransform;
use crate::camera::{Resolution, VideoFrame};
use crate::pose::Pose;

/// レンダーループが持つ描画先
///
/// 座標は常に元映像のピクセル。鏡像は `present` で映像と全レイヤーに同じく適用する。
pub trait OverlaySurface {
    /// 実際の映像サイズに合わせる
    fn resize(&mut self, resolution: Resolution);

    /// 全レイヤーを消去
    fn clear(&mut self);

    fn draw_garment(&mut self, garment: &RgbaImage, placement: &AlignmentTransform);

    fn draw_skeleton(&mut self, pose: &Pose, threshold: f32);

    /// `frame` の上にレイヤーを重ねて表示
    fn present(&mut self, _frame: &VideoFrame) -> Result<()> {
        Ok(())
    }
}

/// 衣服レイヤーとデバッグ骨格レイヤー
#[derive(Debug, Clone)]
pub struct Overlay {
    pub garment: Canvas,
    pub skeleton: Canvas,
}

impl Overlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            garment: Canvas::new(width, height),
            skeleton: Canvas::new(width, height),
        }
    }

    pub fn layers(&self) -> [&RgbaImage; 2] {
        [self.garment.image(), self.skeleton.image()]
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl OverlaySurface for Overlay {
    fn resize(&mut self, resolution: Resolution) {
        self.garment.resize(resolution.width, resolution.height);
        self.skeleton.resize(resolution.width, resolution.height);
    }

    fn clear(&mut self) {
        self.garment.clear();
        self.skeleton.clear();
    }

    fn draw_garment(&mut self, garment: &RgbaImage, placement: &AlignmentTransform) {
        self.garment.draw_image(garment, placement);
    }

    fn draw_skeleton(&mut self, pose: &Pose, threshold: f32) {
        draw_skeleton(&mut self.skeleton, pose, threshold);
    }
}
