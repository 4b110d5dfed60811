pub mod catalog;
pub mod compositor;
pub mod library;
pub mod loader;

pub use catalog::{base_garment_url, Product};
pub use compositor::{composite, design_placement, CompositeGarment, DesignPlacement};
pub use library::{CompositeRequest, GarmentLibrary, Selection};
pub use loader::{AssetLoader, FileAssetLoader};
