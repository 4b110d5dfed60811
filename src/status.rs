use std::fmt;

use crate::error::TryOnError;

/// 画面に出す状態表示
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Idle,
    StartingCamera,
    LoadingModel,
    WaitingForVideo,
    Running,
    NoPersonDetected,
    /// 人物はいるが肩の信頼度が足りない
    ShouldersNotVisible,
    Stopped,
    Failed(TryOnError),
}

impl Status {
    fn is_failure(&self) -> bool {
        matches!(self, Status::Failed(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::StartingCamera => write!(f, "starting camera"),
            Status::LoadingModel => write!(f, "loading model"),
            Status::WaitingForVideo => write!(f, "waiting for video"),
            Status::Running => write!(f, "running"),
            Status::NoPersonDetected => write!(f, "No person detected"),
            Status::ShouldersNotVisible => write!(f, "Shoulders not visible"),
            Status::Stopped => write!(f, "stopped"),
            Status::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// 単一の状態表示欄。変化した時だけログに出す。
#[derive(Debug)]
pub struct StatusBoard {
    current: Status,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self { current: Status::Idle }
    }

    pub fn set(&mut self, status: Status) {
        if self.current == status {
            return;
        }
        if status.is_failure() {
            log::warn!("status: {}", status);
        } else {
            log::info!("status: {}", status);
        }
        self.current = status;
    }

    pub fn report(&mut self, error: TryOnError) {
        self.set(Status::Failed(error));
    }

    pub fn current(&self) -> &Status {
        &self.current
    }

    pub fn text(&self) -> String {
        self.current.to_string()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
