use crate::camera::VideoFrame;
use crate::error::TryOnError;

use super::estimator::PoseEstimator;
use super::keypoint::{Keypoint, Pose};

/// キーポイント座標のEMA平滑化フィルタ
///
/// 位置: 成分ごとのEMA
/// スコア: 最新値をそのまま使う
pub struct KeypointSmoother {
    alpha: f32,
    prev: Option<Pose>,
}

impl KeypointSmoother {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            prev: None,
        }
    }

    pub fn apply(&mut self, pose: Pose) -> Pose {
        let prev = match self.prev.take() {
            Some(prev) => prev,
            None => {
                self.prev = Some(pose.clone());
                return pose;
            }
        };

        let a = self.alpha;
        let mut result = pose;
        for (kp, old) in result.keypoints.iter_mut().zip(prev.keypoints.iter()) {
            *kp = Keypoint::new(
                a * kp.x + (1.0 - a) * old.x,
                a * kp.y + (1.0 - a) * old.y,
                kp.score,
            );
        }

        self.prev = Some(result.clone());
        result
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

/// 任意の推定器に平滑化を被せる。人物を見失ったらリセット。
pub struct Smoothed<E> {
    inner: E,
    smoother: Option<KeypointSmoother>,
}

impl<E> Smoothed<E> {
    /// `alpha` が None なら素通し
    pub fn new(inner: E, alpha: Option<f32>) -> Self {
        Self {
            inner,
            smoother: alpha.map(KeypointSmoother::new),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: PoseEstimator> PoseEstimator for Smoothed<E> {
    async fn estimate(&mut self, frame: &VideoFrame) -> Result<Option<Pose>, TryOnError> {
        let pose = self.inner.estimate(frame).await?;
        let Some(smoother) = self.smoother.as_mut() else {
            return Ok(pose);
        };
        match pose {
            Some(pose) => Ok(Some(smoother.apply(pose))),
            None => {
                smoother.reset();
                Ok(None)
            }
        }
    }
}
