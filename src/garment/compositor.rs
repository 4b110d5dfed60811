//! ベース衣服画像にデザインを焼き込む

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// ベース幅に対するデザイン幅の比
pub const DESIGN_WIDTH_RATIO: f32 = 0.5;
/// ベース高さに対するデザイン上端の位置
pub const DESIGN_TOP_RATIO: f32 = 0.3;

/// `(商品, 色)` ごとの合成済み衣服
#[derive(Debug, Clone)]
pub struct CompositeGarment {
    pub product_id: String,
    pub color: String,
    pub image: RgbaImage,
}

impl CompositeGarment {
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// ベース画像上のデザイン配置（ベース画像のピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignPlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 水平中央、上端はベース高さの `DESIGN_TOP_RATIO`。
/// 高さは幅から求め、デザインの縦横比を保つ。
pub fn design_placement(base: (u32, u32), design: (u32, u32)) -> Option<DesignPlacement> {
    let (base_w, base_h) = (base.0 as f32, base.1 as f32);
    let (design_w, design_h) = design;
    if design_w == 0 || design_h == 0 || base.0 == 0 || base.1 == 0 {
        return None;
    }

    let width = base_w * DESIGN_WIDTH_RATIO;
    let height = width * design_h as f32 / design_w as f32;
    Some(DesignPlacement {
        x: (base_w - width) / 2.0,
        y: base_h * DESIGN_TOP_RATIO,
        width,
        height,
    })
}

/// 入力2枚だけで決まる。同じ画像からは常に同じピクセルが出る。
pub fn composite(base: &RgbaImage, design: &RgbaImage) -> RgbaImage {
    let mut out = base.clone();
    let Some(place) = design_placement(base.dimensions(), design.dimensions()) else {
        return out;
    };

    let w = place.width.round().max(1.0) as u32;
    let h = place.height.round().max(1.0) as u32;
    let scaled = imageops::resize(design, w, h, FilterType::Triangle);
    imageops::overlay(&mut out, &scaled, place.x.round() as i64, place.y.round() as i64);
    out
}
