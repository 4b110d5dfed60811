use image::{RgbImage, RgbaImage};

/// 映像とレイヤーを 0RGB バッファへ合成する。
///
/// 鏡像は全レイヤー同じ変換（水平反転）で適用するので、鏡像前の座標で
/// 描いたキーポイントや衣服は鏡像映像の上でも位置が合う。
/// サイズが映像と異なるレイヤーは無視する。
pub fn compose_frame(video: &RgbImage, layers: &[&RgbaImage], mirrored: bool, out: &mut Vec<u32>) {
    let (width, height) = video.dimensions();
    out.clear();
    out.reserve((width * height) as usize);

    let layers: Vec<&RgbaImage> = layers
        .iter()
        .copied()
        .filter(|l| l.dimensions() == (width, height))
        .collect();

    for y in 0..height {
        for x in 0..width {
            let sx = if mirrored { width - 1 - x } else { x };
            let v = video.get_pixel(sx, y);
            let mut rgb = [v[0] as u32, v[1] as u32, v[2] as u32];

            for layer in &layers {
                let p = layer.get_pixel(sx, y);
                let a = p[3] as u32;
                if a == 0 {
                    continue;
                }
                for c in 0..3 {
                    rgb[c] = (p[c] as u32 * a + rgb[c] * (255 - a) + 127) / 255;
                }
            }

            out.push((rgb[0] << 16) | (rgb[1] << 8) | rgb[2]);
        }
    }
}
