//! 試着パイプラインのエラー分類
//!
//! どのエラーも止めるのは自分の担当部分（カメラ、モデル、画像1枚、1フレーム）だけで、
//! 状態表示に出す。

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    PermissionDenied,
    NotFound,
    Busy,
    Timeout,
    Unavailable(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::PermissionDenied => write!(f, "camera permission denied"),
            CameraError::NotFound => write!(f, "no camera device found"),
            CameraError::Busy => write!(f, "camera is in use by another application"),
            CameraError::Timeout => write!(f, "camera did not start in time"),
            CameraError::Unavailable(cause) => write!(f, "camera unavailable: {}", cause),
        }
    }
}

impl std::error::Error for CameraError {}

/// 画像がどちらの層のものか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Base,
    Design,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Base => write!(f, "base garment"),
            AssetKind::Design => write!(f, "design"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TryOnError {
    Camera(CameraError),
    ModelLoad(String),
    AssetLoad {
        asset: AssetKind,
        url: String,
        reason: String,
    },
    /// 一時的。次のフレームで再試行する。
    Estimation(String),
    /// ループ1回分の失敗
    Frame(String),
}

impl fmt::Display for TryOnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryOnError::Camera(e) => write!(f, "Camera error: {}", e),
            TryOnError::ModelLoad(cause) => write!(f, "Model failed to load: {}", cause),
            TryOnError::AssetLoad { asset, url, reason } => {
                write!(f, "Failed to load {} image {}: {}", asset, url, reason)
            }
            TryOnError::Estimation(cause) => write!(f, "Pose estimation failed: {}", cause),
            TryOnError::Frame(cause) => write!(f, "Frame failed: {}", cause),
        }
    }
}

impl std::error::Error for TryOnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TryOnError::Camera(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CameraError> for TryOnError {
    fn from(e: CameraError) -> Self {
        TryOnError::Camera(e)
    }
}
