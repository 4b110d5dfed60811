//! `GET /products/{id}` が返す商品レコード

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// 試着に必要な項目だけ。他のフィールドは無視する。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub colors: Vec<String>,
    pub design_image_url: String,
}

impl Product {
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("Invalid product record")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&body)
    }

    pub fn has_color(&self, color: &str) -> bool {
        self.colors.iter().any(|c| c == color)
    }

    /// `current` の次の色（末尾の次は先頭）
    pub fn next_color(&self, current: Option<&str>) -> Option<&str> {
        let position = current.and_then(|c| self.colors.iter().position(|x| x == c));
        let next = match position {
            Some(i) => (i + 1) % self.colors.len(),
            None => 0,
        };
        self.colors.get(next).map(String::as_str)
    }
}

/// 色ごとのベース画像のURL（命名規約による）
pub fn base_garment_url(assets_root: &str, color: &str) -> String {
    let file = format!("base_shirt_{}.png", color.to_lowercase());
    if assets_root.is_empty() {
        file
    } else {
        format!("{}/{}", assets_root.trim_end_matches('/'), file)
    }
}
