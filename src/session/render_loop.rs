use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::handle::{Control, SessionHandle};
use super::scheduler::FrameScheduler;
use crate::align::{align, GarmentTemplate};
use crate::camera::CaptureSource;
use crate::config::{Config, DetectorConfig};
use crate::error::{CameraError, TryOnError};
use crate::garment::{CompositeGarment, CompositeRequest, GarmentLibrary, Selection};
use crate::pose::{PoseEstimator, PoseModel};
use crate::render::OverlaySurface;
use crate::status::{Status, StatusBoard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub template: GarmentTemplate,
    pub detector: DetectorConfig,
    pub camera_timeout: Duration,
    pub model_timeout: Duration,
    pub skeleton_threshold: f32,
    pub debug_skeleton: bool,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            template: config.garment.template.clone(),
            detector: config.detector.clone(),
            camera_timeout: config.camera.start_timeout(),
            model_timeout: config.detector.load_timeout(),
            skeleton_threshold: config.render.skeleton_threshold,
            debug_skeleton: config.render.debug_skeleton,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

type PendingComposite = LocalBoxFuture<'static, Result<CompositeGarment, TryOnError>>;

/// キャプチャ → 姿勢推定 → 位置合わせ → 描画を1フレームごとに回すループ
///
/// 1回の反復の中では推定が終わってから位置合わせし、描画の前に必ずクリアする。
/// 推論は常に高々1つ。
pub struct RenderLoop<C, M: PoseModel, F, O> {
    capture: C,
    model: M,
    detector: Option<M::Detector>,
    scheduler: F,
    surface: O,
    library: GarmentLibrary,
    settings: LoopSettings,
    control: Rc<Control>,
    selection: watch::Receiver<Selection>,
    garment: Option<Rc<CompositeGarment>>,
    pending: Option<PendingComposite>,
    asset_error: Option<TryOnError>,
    state: LoopState,
    status: StatusBoard,
}

impl<C, M, F, O> RenderLoop<C, M, F, O>
where
    C: CaptureSource,
    M: PoseModel,
    F: FrameScheduler,
    O: OverlaySurface,
{
    pub fn new(
        capture: C,
        model: M,
        scheduler: F,
        surface: O,
        library: GarmentLibrary,
        settings: LoopSettings,
    ) -> Self {
        let (control, selection) = Control::new(settings.debug_skeleton);
        Self {
            capture,
            model,
            detector: None,
            scheduler,
            surface,
            library,
            settings,
            control,
            selection,
            garment: None,
            pending: None,
            asset_error: None,
            state: LoopState::Idle,
            status: StatusBoard::new(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.control.clone())
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn status(&self) -> &Status {
        self.status.current()
    }

    pub fn status_text(&self) -> String {
        self.status.text()
    }

    pub fn surface(&self) -> &O {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut O {
        &mut self.surface
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn library(&self) -> &GarmentLibrary {
        &self.library
    }

    pub fn garment(&self) -> Option<&CompositeGarment> {
        self.garment.as_deref()
    }

    /// カメラ → モデルの順に起動する。それぞれタイムアウト付き。
    ///
    /// モデル読み込み中もカメラ映像は表示する（レイヤーは空）。
    /// 失敗したら `Idle` に戻り、エラーを状態表示に出す。
    /// 起動中にハンドルから `stop()` されたら即座に後始末して `Ok` を返す。
    pub async fn start(&mut self) -> Result<(), TryOnError> {
        if self.state != LoopState::Idle {
            return Ok(());
        }
        self.state = LoopState::Starting;
        let token = self.control.arm();

        self.status.set(Status::StartingCamera);
        let acquired = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            r = timeout(self.settings.camera_timeout, self.capture.acquire()) => Some(r),
        };
        let resolution = match acquired {
            None => {
                self.stop();
                return Ok(());
            }
            Some(Ok(Ok(resolution))) => resolution,
            Some(Ok(Err(e))) => return self.abort_start(e.into()),
            Some(Err(_)) => return self.abort_start(CameraError::Timeout.into()),
        };
        log::info!("Video {}x{}", resolution.width, resolution.height);
        self.surface.resize(resolution);
        self.surface.clear();

        self.status.set(Status::LoadingModel);
        let model_timeout = self.settings.model_timeout;
        let loaded = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            r = timeout(model_timeout, self.model.initialize(&self.settings.detector)) => Some(r),
            _ = preview(&mut self.scheduler, &self.capture, &mut self.surface) => None,
        };
        let detector = match loaded {
            None => {
                self.stop();
                return Ok(());
            }
            Some(Ok(Ok(detector))) => detector,
            Some(Ok(Err(e))) => return self.abort_start(e),
            Some(Err(_)) => {
                let cause = format!("timed out after {}s", model_timeout.as_secs_f32());
                return self.abort_start(TryOnError::ModelLoad(cause));
            }
        };

        self.detector = Some(detector);
        self.state = LoopState::Running;
        self.status.set(Status::Running);
        Ok(())
    }

    /// ハンドルから止められるか表示先が消えるまで回し、最後に停止処理をする
    pub async fn run(&mut self) {
        if self.state != LoopState::Running {
            return;
        }
        let token = self.control.token();

        loop {
            let proceed = tokio::select! {
                biased;
                _ = token.cancelled() => false,
                more = self.scheduler.next_frame() => more,
            };
            if !proceed || token.is_cancelled() {
                break;
            }
            self.step(&token).await;
        }

        self.stop();
    }

    /// 1回分の反復。エラーもパニックもこのフレーム内で止めて状態表示に出す。
    pub async fn step(&mut self, token: &CancellationToken) {
        match AssertUnwindSafe(self.tick(token)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.status.report(e),
            Err(payload) => self.status.report(TryOnError::Frame(panic_message(payload.as_ref()))),
        }
    }

    /// カメラ解放・スケジュール取消・オーバーレイ消去。何度呼んでもよい。
    pub fn stop(&mut self) {
        self.control.cancel();
        self.state = LoopState::Stopping;
        self.teardown();
        self.status.set(Status::Stopped);
    }

    fn teardown(&mut self) {
        self.capture.release();
        self.detector = None;
        self.surface.clear();
        self.state = LoopState::Idle;
    }

    fn abort_start(&mut self, error: TryOnError) -> Result<(), TryOnError> {
        self.control.cancel();
        self.teardown();
        self.status.report(error.clone());
        Err(error)
    }

    async fn tick(&mut self, token: &CancellationToken) -> Result<(), TryOnError> {
        self.refresh_garment();

        if !self.capture.is_ready() {
            self.status.set(Status::WaitingForVideo);
            return Ok(());
        }
        let Some(frame) = self.capture.latest_frame() else {
            self.status.set(Status::WaitingForVideo);
            return Ok(());
        };
        let Some(detector) = self.detector.as_mut() else {
            return Ok(());
        };

        let estimate = detector.estimate(&frame).await;
        if token.is_cancelled() {
            log::debug!("Discarding inference for frame {} after stop", frame.sequence);
            return Ok(());
        }

        self.surface.clear();
        match estimate {
            Err(e) => self.status.report(e),
            Ok(None) => self.status.set(Status::NoPersonDetected),
            Ok(Some(pose)) => {
                if self.control.debug_skeleton() {
                    self.surface.draw_skeleton(&pose, self.settings.skeleton_threshold);
                }
                match &self.garment {
                    Some(garment) => match align(&pose, garment.size(), &self.settings.template) {
                        Some(placement) => {
                            self.surface.draw_garment(&garment.image, &placement);
                            self.status.set(Status::Running);
                        }
                        None => self.status.set(Status::ShouldersNotVisible),
                    },
                    None => match &self.asset_error {
                        Some(e) => self.status.report(e.clone()),
                        None => self.status.set(Status::Running),
                    },
                }
            }
        }

        self.surface
            .present(&frame)
            .map_err(|e| TryOnError::Frame(format!("{:#}", e)))
    }

    /// 選択が変わったら合成を開始し、終わっていれば受け取る。画像読み込みは待たない。
    fn refresh_garment(&mut self) {
        if self.selection.has_changed().unwrap_or(false) {
            let selection = self.selection.borrow_and_update().clone();
            self.garment = None;
            self.pending = None;
            self.asset_error = None;
            match self.library.request(&selection) {
                CompositeRequest::Ready(garment) => self.garment = Some(garment),
                CompositeRequest::Pending(future) => self.pending = Some(future),
                CompositeRequest::Unavailable => {}
            }
        }

        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let Some(result) = pending.now_or_never() else {
            return;
        };
        self.pending = None;
        match result {
            Ok(garment) => {
                log::info!("Composited {} / {}", garment.product_id, garment.color);
                self.garment = Some(self.library.insert(garment));
            }
            Err(e) => {
                self.status.report(e.clone());
                self.asset_error = Some(e);
            }
        }
    }
}

/// モデル読み込み中のプレビュー。空のレイヤーで映像だけ出す。
///
/// 表示先が消えても読み込みは続ける（`run` が次のフレームで気付いて止める）。
async fn preview<F, C, O>(scheduler: &mut F, capture: &C, surface: &mut O)
where
    F: FrameScheduler,
    C: CaptureSource,
    O: OverlaySurface,
{
    while scheduler.next_frame().await {
        let Some(frame) = capture.latest_frame() else {
            continue;
        };
        if let Err(e) = surface.present(&frame) {
            log::debug!("Preview frame {} not shown: {:#}", frame.sequence, e);
        }
    }
    std::future::pending::<()>().await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::AlignmentTransform;
    use crate::camera::{Resolution, VideoFrame};
    use crate::garment::library::tests::{product, MemoryLoader};
    use crate::pose::{Keypoint, KeypointIndex, Pose};
    use image::{RgbImage, RgbaImage};
    use std::cell::{Cell, RefCell};
    use tokio::sync::{oneshot, Notify};

    const VIDEO: Resolution = Resolution { width: 64, height: 48 };

    #[derive(Default)]
    struct FakeCapture {
        fail: Option<CameraError>,
        hang: bool,
        acquired: bool,
        /// 開いたがまだデコード済みフレームがない
        decoding: bool,
        releases: usize,
    }

    impl CaptureSource for FakeCapture {
        async fn acquire(&mut self) -> Result<Resolution, CameraError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some(e) = self.fail.clone() {
                return Err(e);
            }
            self.acquired = true;
            Ok(VIDEO)
        }

        fn release(&mut self) {
            self.acquired = false;
            self.releases += 1;
        }

        fn is_ready(&self) -> bool {
            self.acquired && !self.decoding
        }

        fn latest_frame(&self) -> Option<VideoFrame> {
            self.is_ready()
                .then(|| VideoFrame::new(RgbImage::new(VIDEO.width, VIDEO.height), 1))
        }
    }

    /// テストと偽推定器で共有する設定
    #[derive(Default)]
    struct Script {
        pose: RefCell<Option<Pose>>,
        gate: RefCell<Option<oneshot::Receiver<()>>>,
        entered: Notify,
        calls: Cell<usize>,
        panic_on_call: Cell<Option<usize>>,
        fail_on_call: Cell<Option<usize>>,
        fail_load: RefCell<Option<TryOnError>>,
        hang_load: Cell<bool>,
    }

    struct FakeModel(Rc<Script>);
    struct FakeDetector(Rc<Script>);

    impl PoseModel for FakeModel {
        type Detector = FakeDetector;

        async fn initialize(&self, _config: &DetectorConfig) -> Result<FakeDetector, TryOnError> {
            if self.0.hang_load.get() {
                std::future::pending::<()>().await;
            }
            if let Some(e) = self.0.fail_load.borrow().clone() {
                return Err(e);
            }
            Ok(FakeDetector(self.0.clone()))
        }
    }

    impl PoseEstimator for FakeDetector {
        async fn estimate(&mut self, _frame: &VideoFrame) -> Result<Option<Pose>, TryOnError> {
            let call = self.0.calls.get() + 1;
            self.0.calls.set(call);
            self.0.entered.notify_one();
            if self.0.panic_on_call.get() == Some(call) {
                panic!("inference backend exploded");
            }
            if self.0.fail_on_call.get() == Some(call) {
                return Err(TryOnError::Estimation("tensor shape mismatch".to_string()));
            }
            let gate = self.0.gate.borrow_mut().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(self.0.pose.borrow().clone())
        }
    }

    /// 決まったフレーム数で終わる
    struct CountdownScheduler(usize);

    impl FrameScheduler for CountdownScheduler {
        async fn next_frame(&mut self) -> bool {
            if self.0 == 0 {
                return false;
            }
            self.0 -= 1;
            true
        }
    }

    #[derive(Default)]
    struct RecordingSurface {
        resized: Vec<Resolution>,
        clears: usize,
        garments: Vec<AlignmentTransform>,
        skeletons: usize,
        presents: usize,
    }

    impl OverlaySurface for RecordingSurface {
        fn resize(&mut self, resolution: Resolution) {
            self.resized.push(resolution);
        }

        fn clear(&mut self) {
            self.clears += 1;
        }

        fn draw_garment(&mut self, _garment: &RgbaImage, placement: &AlignmentTransform) {
            self.garments.push(*placement);
        }

        fn draw_skeleton(&mut self, _pose: &Pose, _threshold: f32) {
            self.skeletons += 1;
        }

        fn present(&mut self, _frame: &VideoFrame) -> anyhow::Result<()> {
            self.presents += 1;
            Ok(())
        }
    }

    type TestLoop = RenderLoop<FakeCapture, FakeModel, CountdownScheduler, RecordingSurface>;

    fn standing_pose() -> Pose {
        let mut pose = Pose::new([Keypoint::new(32.0, 10.0, 0.8); KeypointIndex::COUNT]);
        pose.set(KeypointIndex::LeftShoulder, Keypoint::new(20.0, 20.0, 0.9));
        pose.set(KeypointIndex::RightShoulder, Keypoint::new(40.0, 20.0, 0.9));
        pose
    }

    fn build(frames: usize, script: &Rc<Script>, loader: &Rc<MemoryLoader>) -> TestLoop {
        let settings = LoopSettings {
            camera_timeout: Duration::from_millis(50),
            model_timeout: Duration::from_millis(50),
            ..LoopSettings::default()
        };
        RenderLoop::new(
            FakeCapture::default(),
            FakeModel(script.clone()),
            CountdownScheduler(frames),
            RecordingSurface::default(),
            GarmentLibrary::new(loader.clone(), "assets"),
            settings,
        )
    }

    fn fixtures() -> (Rc<Script>, Rc<MemoryLoader>) {
        let script = Rc::new(Script::default());
        *script.pose.borrow_mut() = Some(standing_pose());
        (script, Rc::new(MemoryLoader::with_shirts(&["white", "black"])))
    }

    #[tokio::test]
    async fn test_start_resizes_to_actual_video() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);

        rl.start().await.unwrap();
        assert_eq!(rl.state(), LoopState::Running);
        assert_eq!(rl.status(), &Status::Running);
        assert_eq!(rl.surface().resized, vec![VIDEO]);
    }

    #[tokio::test]
    async fn test_garment_drawn_every_frame() {
        let (script, loader) = fixtures();
        let mut rl = build(3, &script, &loader);
        rl.handle().select_product(product(), None);

        rl.start().await.unwrap();
        rl.run().await;

        let s = rl.surface();
        assert_eq!(s.garments.len(), 3);
        assert_eq!(s.presents, 3);
        assert_eq!(s.skeletons, 0);
        let t = s.garments[0];
        assert!((t.height / t.width - 581.0 / 440.0).abs() < 1e-5);
        assert_eq!(rl.state(), LoopState::Idle);
        assert_eq!(rl.status_text(), "stopped");
    }

    #[tokio::test]
    async fn test_draw_always_follows_clear() {
        let (script, loader) = fixtures();
        let mut rl = build(4, &script, &loader);
        rl.handle().select_product(product(), None);

        rl.start().await.unwrap();
        let clears_after_start = rl.surface().clears;
        rl.run().await;

        // フレームごとに1回 + stop の1回
        assert_eq!(rl.surface().clears - clears_after_start, 4 + 1);
    }

    #[tokio::test]
    async fn test_no_person_skips_drawing() {
        let (script, loader) = fixtures();
        *script.pose.borrow_mut() = None;
        let mut rl = build(2, &script, &loader);
        rl.handle().select_product(product(), None);

        rl.start().await.unwrap();
        let token = rl.control.token();
        rl.step(&token).await;
        assert_eq!(rl.status_text(), "No person detected");
        rl.run().await;
        assert!(rl.surface().garments.is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_shoulders_skip_drawing() {
        let (script, loader) = fixtures();
        let mut pose = standing_pose();
        pose.set(KeypointIndex::LeftShoulder, Keypoint::new(20.0, 20.0, 0.2));
        *script.pose.borrow_mut() = Some(pose);
        let mut rl = build(0, &script, &loader);
        rl.handle().select_product(product(), None);

        rl.start().await.unwrap();
        let token = rl.control.token();
        rl.step(&token).await;
        assert!(rl.surface().garments.is_empty());
        assert_eq!(rl.status(), &Status::ShouldersNotVisible);
    }

    #[tokio::test]
    async fn test_debug_skeleton_toggle() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);
        let handle = rl.handle();

        rl.start().await.unwrap();
        let token = rl.control.token();
        rl.step(&token).await;
        assert_eq!(rl.surface().skeletons, 0);

        handle.set_debug_skeleton(true);
        rl.step(&token).await;
        assert_eq!(rl.surface().skeletons, 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);
        rl.start().await.unwrap();

        rl.stop();
        let clears = rl.surface().clears;
        assert_eq!(rl.state(), LoopState::Idle);
        assert_eq!(rl.status_text(), "stopped");
        assert!(!rl.capture().acquired);

        rl.stop();
        assert_eq!(rl.state(), LoopState::Idle);
        assert_eq!(rl.status_text(), "stopped");
        assert!(!rl.capture().acquired);
        assert_eq!(rl.surface().clears, clears + 1);
        assert!(!rl.handle().is_active());
    }

    #[tokio::test]
    async fn test_inference_resolving_after_stop_is_not_drawn() {
        let (script, loader) = fixtures();
        let (release, gate) = oneshot::channel();
        *script.gate.borrow_mut() = Some(gate);
        let mut rl = build(10, &script, &loader);
        let handle = rl.handle();
        handle.select_product(product(), None);
        handle.set_debug_skeleton(true);

        rl.start().await.unwrap();
        futures::join!(rl.run(), async {
            script.entered.notified().await;
            handle.stop();
            let _ = release.send(());
        });

        assert_eq!(script.calls.get(), 1);
        assert!(rl.surface().garments.is_empty());
        assert_eq!(rl.surface().skeletons, 0);
        assert_eq!(rl.surface().presents, 0);
        assert_eq!(rl.status_text(), "stopped");
        assert!(!rl.capture().acquired);
    }

    #[tokio::test]
    async fn test_color_change_recomposites_once() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);
        let handle = rl.handle();
        handle.select_product(product(), Some("white"));

        rl.start().await.unwrap();
        let token = rl.control.token();
        for _ in 0..5 {
            rl.step(&token).await;
        }
        assert_eq!(rl.library().builds(), 1);
        assert_eq!(rl.garment().map(|g| g.color.as_str()), Some("white"));

        handle.select_color("black");
        for _ in 0..5 {
            rl.step(&token).await;
        }
        assert_eq!(rl.library().builds(), 2);
        assert_eq!(loader.fetch_count("assets/base_shirt_black.png"), 1);

        handle.select_color("black");
        for _ in 0..5 {
            rl.step(&token).await;
        }
        assert_eq!(rl.library().builds(), 2);

        // キャッシュ済みの色に戻る: 再合成なし
        handle.select_color("white");
        rl.step(&token).await;
        assert_eq!(rl.library().builds(), 2);
        assert_eq!(rl.garment().map(|g| g.color.as_str()), Some("white"));
    }

    #[tokio::test]
    async fn test_asset_failure_keeps_loop_alive() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);
        let handle = rl.handle();
        handle.select_product(product(), None);
        handle.select_color("red");

        rl.start().await.unwrap();
        let token = rl.control.token();
        rl.step(&token).await;
        rl.step(&token).await;

        assert!(rl.surface().garments.is_empty());
        assert_eq!(rl.surface().presents, 2);
        assert!(rl.status_text().contains("assets/base_shirt_red.png"));
        assert_eq!(rl.state(), LoopState::Running);

        handle.select_color("black");
        rl.step(&token).await;
        assert_eq!(rl.surface().garments.len(), 1);
        assert_eq!(rl.status(), &Status::Running);
    }

    #[tokio::test]
    async fn test_panicking_frame_does_not_kill_loop() {
        let (script, loader) = fixtures();
        script.panic_on_call.set(Some(2));
        let mut rl = build(0, &script, &loader);
        rl.handle().select_product(product(), None);

        rl.start().await.unwrap();
        let token = rl.control.token();
        rl.step(&token).await;
        rl.step(&token).await;
        assert!(rl.status_text().starts_with("Frame failed: panic"));
        rl.step(&token).await;

        assert_eq!(script.calls.get(), 3);
        assert_eq!(rl.surface().garments.len(), 2);
        assert_eq!(rl.status(), &Status::Running);
    }

    #[tokio::test]
    async fn test_camera_error_returns_to_idle() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);
        rl.capture.fail = Some(CameraError::PermissionDenied);

        let err = rl.start().await.unwrap_err();
        assert_eq!(err, TryOnError::Camera(CameraError::PermissionDenied));
        assert_eq!(rl.state(), LoopState::Idle);
        assert_eq!(rl.status_text(), "Camera error: camera permission denied");
        assert_eq!(script.calls.get(), 0);

        // 権限を直してから再試行
        rl.capture.fail = None;
        rl.start().await.unwrap();
        assert_eq!(rl.state(), LoopState::Running);
    }

    #[tokio::test]
    async fn test_camera_timeout() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);
        rl.capture.hang = true;

        let err = rl.start().await.unwrap_err();
        assert_eq!(err, TryOnError::Camera(CameraError::Timeout));
        assert_eq!(rl.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_model_failure_releases_camera() {
        let (script, loader) = fixtures();
        *script.fail_load.borrow_mut() = Some(TryOnError::ModelLoad("no backend".to_string()));
        let mut rl = build(0, &script, &loader);

        let err = rl.start().await.unwrap_err();
        assert!(matches!(err, TryOnError::ModelLoad(_)));
        assert_eq!(rl.state(), LoopState::Idle);
        assert!(!rl.capture().acquired);
        assert_eq!(rl.status_text(), "Model failed to load: no backend");
    }

    #[tokio::test]
    async fn test_model_load_timeout() {
        let (script, loader) = fixtures();
        script.hang_load.set(true);
        let mut rl = build(0, &script, &loader);

        let err = rl.start().await.unwrap_err();
        assert!(matches!(err, TryOnError::ModelLoad(ref cause) if cause.contains("timed out")));
        assert_eq!(rl.capture().releases, 1);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (script, loader) = fixtures();
        let mut rl = build(2, &script, &loader);
        rl.handle().select_product(product(), None);

        rl.start().await.unwrap();
        rl.run().await;
        assert_eq!(rl.state(), LoopState::Idle);

        rl.scheduler = CountdownScheduler(2);
        rl.start().await.unwrap();
        assert!(rl.handle().is_active());
        rl.run().await;
        assert_eq!(rl.surface().garments.len(), 4);
        assert_eq!(rl.library().builds(), 1);
    }

    #[tokio::test]
    async fn test_preview_shown_while_model_loads() {
        let (script, loader) = fixtures();
        script.hang_load.set(true);
        let mut rl = build(4, &script, &loader);
        rl.handle().select_product(product(), None);

        let err = rl.start().await.unwrap_err();
        assert!(matches!(err, TryOnError::ModelLoad(_)));

        let s = rl.surface();
        assert_eq!(s.resized, vec![VIDEO]);
        assert_eq!(s.presents, 4);
        assert!(s.garments.is_empty());
        assert_eq!(s.skeletons, 0);
        assert_eq!(script.calls.get(), 0);
    }

    #[tokio::test]
    async fn test_stop_while_model_loads_releases_camera_at_once() {
        let (script, loader) = fixtures();
        script.hang_load.set(true);
        let mut rl = build(2, &script, &loader);
        rl.settings.model_timeout = Duration::from_secs(5);
        let handle = rl.handle();

        let begin = tokio::time::Instant::now();
        let (started, ()) = futures::join!(rl.start(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.stop();
        });

        assert!(started.is_ok());
        assert!(begin.elapsed() < Duration::from_secs(1));
        assert_eq!(rl.state(), LoopState::Idle);
        assert_eq!(rl.status_text(), "stopped");
        assert!(!rl.capture().acquired);
        assert_eq!(rl.capture().releases, 1);
        assert!(!handle.is_active());

        // 止めた後の run は何もしない
        rl.run().await;
        assert_eq!(script.calls.get(), 0);
    }

    #[tokio::test]
    async fn test_stop_while_camera_starts() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);
        rl.capture.hang = true;
        rl.settings.camera_timeout = Duration::from_secs(5);
        let handle = rl.handle();

        let begin = tokio::time::Instant::now();
        let (started, ()) = futures::join!(rl.start(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.stop();
        });

        assert!(started.is_ok());
        assert!(begin.elapsed() < Duration::from_secs(1));
        assert_eq!(rl.status_text(), "stopped");
        assert_eq!(rl.state(), LoopState::Idle);
        assert!(rl.surface().resized.is_empty());
    }

    #[tokio::test]
    async fn test_waits_for_first_decoded_frame() {
        let (script, loader) = fixtures();
        let mut rl = build(0, &script, &loader);
        rl.handle().select_product(product(), None);
        rl.capture.decoding = true;

        rl.start().await.unwrap();
        let token = rl.control.token();
        rl.step(&token).await;
        rl.step(&token).await;
        assert_eq!(script.calls.get(), 0);
        assert_eq!(rl.status_text(), "waiting for video");
        assert_eq!(rl.surface().presents, 0);
        assert!(rl.surface().garments.is_empty());

        rl.capture.decoding = false;
        rl.step(&token).await;
        assert_eq!(script.calls.get(), 1);
        assert_eq!(rl.status(), &Status::Running);
        assert_eq!(rl.surface().garments.len(), 1);
    }

    #[tokio::test]
    async fn test_estimation_error_is_transient() {
        let (script, loader) = fixtures();
        script.fail_on_call.set(Some(1));
        let mut rl = build(0, &script, &loader);
        rl.handle().select_product(product(), None);

        rl.start().await.unwrap();
        let token = rl.control.token();
        rl.step(&token).await;
        assert_eq!(rl.status_text(), "Pose estimation failed: tensor shape mismatch");
        assert!(rl.surface().garments.is_empty());
        assert_eq!(rl.state(), LoopState::Running);

        rl.step(&token).await;
        assert_eq!(script.calls.get(), 2);
        assert_eq!(rl.status(), &Status::Running);
        assert_eq!(rl.surface().garments.len(), 1);
    }
}
