pub mod canvas;
pub mod compose;
pub mod overlay;
pub mod skeleton;
#[cfg(feature = "desktop")]
pub mod window;

pub use canvas::Canvas;
pub use compose::compose_frame;
pub use overlay::{Overlay, OverlaySurface};
pub use skeleton::{draw_skeleton, SKELETON_CONNECTIONS};
#[cfg(feature = "desktop")]
pub use window::MirrorWindow;
