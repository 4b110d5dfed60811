use crate::camera::VideoFrame;
use crate::config::DetectorConfig;
use crate::error::TryOnError;

use super::keypoint::Pose;

/// 単一人物の姿勢推定器
#[allow(async_fn_in_trait)]
pub trait PoseEstimator {
    /// デコード済みフレームから姿勢を推定する。
    ///
    /// 人物が見つからない（平均信頼度が `min_pose_score` 未満）場合は `Ok(None)`。
    /// エラーは一時的なもので、呼び出し側は次フレームで再試行する。
    async fn estimate(&mut self, frame: &VideoFrame) -> Result<Option<Pose>, TryOnError>;
}

/// 推定器を作るモデル。読み込みは重いので非同期。
#[allow(async_fn_in_trait)]
pub trait PoseModel {
    type Detector: PoseEstimator;

    async fn initialize(&self, config: &DetectorConfig) -> Result<Self::Detector, TryOnError>;
}

/// 平均信頼度が閾値未満なら人物なしとみなす
pub fn accept_pose(pose: Pose, min_pose_score: f32) -> Option<Pose> {
    if pose.average_score() >= min_pose_score {
        Some(pose)
    } else {
        None
    }
}
