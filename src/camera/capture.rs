use anyhow::{Context, Result};
use image::RgbImage;
use opencv::{
    core::{AlgorithmHint, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::{CaptureSource, ReadBackoff, Resolution, VideoFrame};
use crate::config::CameraConfig;
use crate::error::CameraError;

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度を指定してカメラを開く
    pub fn open_with_resolution(index: i32, width: u32, height: u32) -> Result<Self, CameraError> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .map_err(|e| CameraError::Unavailable(e.to_string()))?;

        if !capture.is_opened().unwrap_or(false) {
            return Err(CameraError::NotFound);
        }

        let configure = |capture: &mut VideoCapture| -> opencv::Result<(u32, u32)> {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
            capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
            let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
            let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
            Ok((actual_width, actual_height))
        };
        let (actual_width, actual_height) =
            configure(&mut capture).map_err(|_| CameraError::Busy)?;
        log::info!(
            "Camera {}: requested {}x{}, got {}x{}",
            index,
            width,
            height,
            actual_width,
            actual_height
        );

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    /// 解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込む（BGR形式）
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// BGR Mat → RgbImage
fn bgr_to_rgb_image(frame: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;
    let width = rgb.cols() as u32;
    let height = rgb.rows() as u32;
    let bytes = rgb.data_bytes()?.to_vec();
    RgbImage::from_raw(width, height, bytes).context("Frame buffer size mismatch")
}

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
pub struct ThreadedCamera {
    latest: Arc<Mutex<Option<VideoFrame>>>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedCamera {
    pub fn start(mut camera: OpenCvCamera) -> Self {
        let (width, height) = camera.resolution();
        let latest = Arc::new(Mutex::new(None::<VideoFrame>));
        let latest_ref = latest.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_ref = running.clone();

        let handle = thread::spawn(move || {
            let mut sequence = 0u64;
            let mut backoff = ReadBackoff::default();
            while running_ref.load(Ordering::Acquire) {
                let image = match camera.read_frame().and_then(|m| bgr_to_rgb_image(&m)) {
                    Ok(image) => image,
                    Err(e) => {
                        let delay = backoff.failed();
                        if backoff.failures() == ReadBackoff::WARN_AFTER {
                            log::warn!("Camera keeps failing to deliver frames: {:#}", e);
                        } else {
                            log::debug!("Frame capture error: {:#}", e);
                        }
                        // 抜かれたカメラで空回りしない
                        thread::sleep(delay);
                        continue;
                    }
                };
                backoff.succeeded();
                sequence += 1;
                if let Ok(mut guard) = latest_ref.lock() {
                    *guard = Some(VideoFrame::new(image, sequence));
                }
            }
        });

        Self {
            latest,
            running,
            width,
            height,
            handle: Some(handle),
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 最新フレームを取得。初回フレーム到着前のみNone。
    pub fn get_frame(&self) -> Option<VideoFrame> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn has_frame(&self) -> bool {
        self.latest.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// キャプチャスレッドを止めて合流する
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Capture thread panicked");
            }
        }
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// CaptureSource の OpenCV 実装
pub struct CameraSource {
    config: CameraConfig,
    camera: Option<ThreadedCamera>,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self { config, camera: None }
    }
}

impl CaptureSource for CameraSource {
    async fn acquire(&mut self) -> Result<Resolution, CameraError> {
        self.release();

        let CameraConfig { index, width, height, .. } = self.config;
        let camera = tokio::task::spawn_blocking(move || {
            OpenCvCamera::open_with_resolution(index, width, height)
        })
        .await
        .map_err(|e| CameraError::Unavailable(e.to_string()))??;

        let threaded = ThreadedCamera::start(camera);
        let (w, h) = threaded.resolution();
        self.camera = Some(threaded);
        Ok(Resolution::new(w, h))
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.stop();
            log::info!("Camera {} released", self.config.index);
        }
    }

    fn is_ready(&self) -> bool {
        self.camera.as_ref().map(|c| c.has_frame()).unwrap_or(false)
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.camera.as_ref().and_then(|c| c.get_frame())
    }
}
