use futures::future::LocalBoxFuture;
use futures::FutureExt;
use image::RgbaImage;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::catalog::{base_garment_url, Product};
use super::compositor::{composite, CompositeGarment};
use super::loader::AssetLoader;
use crate::error::{AssetKind, TryOnError};

/// 現在選択中の商品と色
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub product: Option<Product>,
    pub color: Option<String>,
}

impl Selection {
    pub fn new(product: Product, color: impl Into<String>) -> Self {
        Self {
            product: Some(product),
            color: Some(color.into()),
        }
    }

    fn key(&self) -> Option<(String, String)> {
        let product = self.product.as_ref()?;
        let color = self.color.as_ref()?;
        Some((product.id.clone(), color.clone()))
    }
}

pub enum CompositeRequest {
    Ready(Rc<CompositeGarment>),
    /// 両方の画像の読み込みとデコードが終わると解決する
    Pending(LocalBoxFuture<'static, Result<CompositeGarment, TryOnError>>),
    /// 未選択
    Unavailable,
}

type ImageCache = Rc<RefCell<HashMap<String, Rc<RgbaImage>>>>;

/// デコード済み画像（URL キー）と合成済み衣服（`(商品ID, 色)` キー）のキャッシュ
pub struct GarmentLibrary {
    loader: Rc<dyn AssetLoader>,
    assets_root: String,
    images: ImageCache,
    composites: HashMap<(String, String), Rc<CompositeGarment>>,
    builds: usize,
}

impl GarmentLibrary {
    pub fn new(loader: Rc<dyn AssetLoader>, assets_root: impl Into<String>) -> Self {
        Self {
            loader,
            assets_root: assets_root.into(),
            images: Rc::new(RefCell::new(HashMap::new())),
            composites: HashMap::new(),
            builds: 0,
        }
    }

    pub fn request(&self, selection: &Selection) -> CompositeRequest {
        let (Some(key), Some(product)) = (selection.key(), selection.product.as_ref()) else {
            return CompositeRequest::Unavailable;
        };
        if let Some(garment) = self.composites.get(&key) {
            return CompositeRequest::Ready(garment.clone());
        }

        let (product_id, color) = key;
        let base_url = base_garment_url(&self.assets_root, &color);
        let design_url = product.design_image_url.clone();
        let loader = self.loader.clone();
        let images = self.images.clone();

        let future = async move {
            let (base, design) = futures::try_join!(
                load_image(loader.as_ref(), &images, AssetKind::Base, base_url),
                load_image(loader.as_ref(), &images, AssetKind::Design, design_url),
            )?;
            Ok::<_, TryOnError>(CompositeGarment {
                product_id,
                color,
                image: composite(&base, &design),
            })
        };
        CompositeRequest::Pending(future.boxed_local())
    }

    /// 合成済み衣服をキャッシュし、共有ハンドルを返す
    pub fn insert(&mut self, garment: CompositeGarment) -> Rc<CompositeGarment> {
        let key = (garment.product_id.clone(), garment.color.clone());
        let garment = Rc::new(garment);
        self.composites.insert(key, garment.clone());
        self.builds += 1;
        garment
    }

    pub fn cached_composites(&self) -> usize {
        self.composites.len()
    }

    /// これまでに合成した回数
    pub fn builds(&self) -> usize {
        self.builds
    }
}

async fn load_image(
    loader: &dyn AssetLoader,
    images: &RefCell<HashMap<String, Rc<RgbaImage>>>,
    asset: AssetKind,
    url: String,
) -> Result<Rc<RgbaImage>, TryOnError> {
    let cached = images.borrow().get(&url).cloned();
    if let Some(image) = cached {
        return Ok(image);
    }

    let fail = |reason: String| TryOnError::AssetLoad {
        asset,
        url: url.clone(),
        reason,
    };
    let bytes = loader.fetch(&url).await.map_err(|e| fail(format!("{:#}", e)))?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| fail(e.to_string()))?
        .to_rgba8();

    log::debug!("Loaded {} image {} ({}x{})", asset, url, decoded.width(), decoded.height());
    let decoded = Rc::new(decoded);
    images.borrow_mut().insert(url, decoded.clone());
    Ok(decoded)
}
