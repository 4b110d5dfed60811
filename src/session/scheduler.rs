use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};

/// 表示更新ごとに1回進む
#[allow(async_fn_in_trait)]
pub trait FrameScheduler {
    /// 次のフレームまで待つ。`false` は表示先が消えたのでセッションを止める合図。
    async fn next_frame(&mut self) -> bool;
}

/// 固定レートのティック。遅れたティックはまとめて出さずに飛ばす。
pub struct IntervalScheduler {
    interval: Interval,
}

impl IntervalScheduler {
    /// Tokio ランタイム内で呼ぶこと
    pub fn new(frame_rate: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

impl FrameScheduler for IntervalScheduler {
    async fn next_frame(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}
