use anyhow::{Context, Result};
use std::rc::Rc;

use fitroom::camera::CameraSource;
use fitroom::config::Config;
use fitroom::garment::{FileAssetLoader, GarmentLibrary, Product};
use fitroom::pose::MoveNetModel;
use fitroom::render::MirrorWindow;
use fitroom::session::{IntervalScheduler, LoopSettings, RenderLoop};

/// 設定ファイルのパス
const CONFIG_PATH: &str = "tryon.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default(CONFIG_PATH);
    let product = Product::load(&config.garment.catalog_path)
        .with_context(|| format!("Failed to load product {}", config.garment.catalog_path))?;
    log::info!("Product: {} ({} colors)", product.name, product.colors.len());

    let library = GarmentLibrary::new(Rc::new(FileAssetLoader::new(".")), config.garment.assets_dir.clone());
    let window = MirrorWindow::new("Try On", config.render.mirrored);

    let mut session = RenderLoop::new(
        CameraSource::new(config.camera.clone()),
        MoveNetModel,
        IntervalScheduler::new(config.render.frame_rate),
        window,
        library,
        LoopSettings::from_config(&config),
    );
    let handle = session.handle();
    session.surface_mut().bind(handle.clone());

    let color = Some(config.garment.default_color.as_str()).filter(|c| !c.is_empty());
    handle.select_product(product, color);

    log::info!("C: next color, D: skeleton overlay, Esc: quit");
    session.start().await?;
    session.run().await;

    log::info!("Bye");
    Ok(())
}
