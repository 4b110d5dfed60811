use anyhow::{Context, Result};
use image::RgbaImage;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use std::time::Instant;

use super::compose::compose_frame;
use super::overlay::{Overlay, OverlaySurface};
use crate::align::AlignmentTransform;
use crate::camera::{Resolution, VideoFrame};
use crate::pose::Pose;
use crate::session::SessionHandle;

/// minifb ウィンドウに鏡像映像とオーバーレイを表示する
///
/// ウィンドウは最初の `resize` で実解像度が分かってから作る。
/// キー操作: C 色切替 / D 骨格表示切替 / Esc 終了
pub struct MirrorWindow {
    title: String,
    mirrored: bool,
    window: Option<Window>,
    overlay: Overlay,
    buffer: Vec<u32>,
    session: Option<SessionHandle>,
    // FPS計測用
    fps_timer: Instant,
    frame_count: u32,
}

impl MirrorWindow {
    pub fn new(title: impl Into<String>, mirrored: bool) -> Self {
        Self {
            title: title.into(),
            mirrored,
            window: None,
            overlay: Overlay::default(),
            buffer: Vec::new(),
            session: None,
            fps_timer: Instant::now(),
            frame_count: 0,
        }
    }

    /// キー操作の送り先
    pub fn bind(&mut self, session: SessionHandle) {
        self.session = Some(session);
    }

    /// ウィンドウが開いているか（作成前は true）
    pub fn is_open(&self) -> bool {
        self.window.as_ref().map(|w| w.is_open()).unwrap_or(true)
    }

    fn open(&mut self, resolution: Resolution) -> Result<()> {
        let window = Window::new(
            &self.title,
            resolution.width as usize,
            resolution.height as usize,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .context("Failed to create window")?;
        self.window = Some(window);
        Ok(())
    }

    fn handle_keys(&self) {
        let (Some(window), Some(session)) = (self.window.as_ref(), self.session.as_ref()) else {
            return;
        };

        if !window.is_open() || window.is_key_down(Key::Escape) {
            session.stop();
            return;
        }
        if window.is_key_pressed(Key::C, KeyRepeat::No) {
            if let Some(color) = session.next_color() {
                log::info!("Color: {}", color);
            }
        }
        if window.is_key_pressed(Key::D, KeyRepeat::No) {
            let enabled = session.toggle_debug_skeleton();
            log::info!("Skeleton overlay: {}", if enabled { "on" } else { "off" });
        }
    }

    fn tick_fps(&mut self) {
        self.frame_count += 1;
        let elapsed = self.fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            log::info!("FPS: {:.1}", self.frame_count as f32 / elapsed);
            self.frame_count = 0;
            self.fps_timer = Instant::now();
        }
    }
}

impl OverlaySurface for MirrorWindow {
    fn resize(&mut self, resolution: Resolution) {
        self.overlay.resize(resolution);
        if self.window.is_none() {
            if let Err(e) = self.open(resolution) {
                log::error!("{:#}", e);
            }
        }
    }

    fn clear(&mut self) {
        self.overlay.clear();
    }

    fn draw_garment(&mut self, garment: &RgbaImage, placement: &AlignmentTransform) {
        self.overlay.draw_garment(garment, placement);
    }

    fn draw_skeleton(&mut self, pose: &Pose, threshold: f32) {
        self.overlay.draw_skeleton(pose, threshold);
    }

    fn present(&mut self, frame: &VideoFrame) -> Result<()> {
        let Resolution { width, height } = frame.resolution();
        compose_frame(&frame.image, &self.overlay.layers(), self.mirrored, &mut self.buffer);

        let window = self.window.as_mut().context("Window is not open")?;
        let shown = window
            .update_with_buffer(&self.buffer, width as usize, height as usize)
            .context("Failed to update window");

        // 表示に失敗しても Esc / クローズは拾う
        self.handle_keys();
        shown?;
        self.tick_fps();
        Ok(())
    }
}
