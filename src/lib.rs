pub mod align;
pub mod camera;
pub mod config;
pub mod error;
pub mod garment;
pub mod pose;
pub mod render;
pub mod session;
pub mod status;
