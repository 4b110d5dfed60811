//! The per-frame try-on session: Idle → Starting → Running → Stopping → Idle.

pub mod handle;
pub mod render_loop;
pub mod scheduler;

pub use handle::SessionHandle;
pub use render_loop::{LoopSettings, LoopState, RenderLoop};
pub use scheduler::{FrameScheduler, IntervalScheduler};
