#[cfg(feature = "desktop")]
pub mod capture;

use image::RgbImage;
use std::time::Duration;

use crate::error::CameraError;

#[cfg(feature = "desktop")]
pub use capture::{CameraSource, OpenCvCamera, ThreadedCamera};

/// 映像の実解像度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// デコード済みの1フレーム（RGB、鏡像前）
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: RgbImage,
    /// 新フレーム到着ごとに増える
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }
}

/// ライブ映像の入力元
#[allow(async_fn_in_trait)]
pub trait CaptureSource {
    /// カメラを開き、実際の解像度を返す（要求値と異なることがある）
    async fn acquire(&mut self) -> Result<Resolution, CameraError>;

    /// 全トラックを停止する。何度呼んでもよい。
    fn release(&mut self);

    /// デコード済みフレームが1枚以上あるか
    fn is_ready(&self) -> bool;

    fn latest_frame(&self) -> Option<VideoFrame>;
}

/// フレーム読み込みの連続失敗に対する待ち時間（指数的に伸ばし、上限あり）
#[derive(Debug, Default)]
pub struct ReadBackoff {
    failures: u32,
}

impl ReadBackoff {
    const BASE: Duration = Duration::from_millis(5);
    const MAX: Duration = Duration::from_millis(500);
    /// この回数続けて失敗したら警告を出す
    pub const WARN_AFTER: u32 = 30;

    /// 失敗を記録し、次の読み込みまでの待ち時間を返す
    pub fn failed(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let shift = (self.failures - 1).min(16);
        (Self::BASE * (1u32 << shift)).min(Self::MAX)
    }

    pub fn succeeded(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
