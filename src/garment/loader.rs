use anyhow::{bail, Context, Result};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::path::PathBuf;

/// URL からアセットのバイト列を取得する
pub trait AssetLoader {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>>>;
}

/// ローカルディレクトリからアセットを読む。`http(s)` の絶対URLは非対応。
pub struct FileAssetLoader {
    root: PathBuf,
}

impl FileAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf> {
        if url.starts_with("http://") || url.starts_with("https://") {
            bail!("remote asset URLs are not supported");
        }
        Ok(self.root.join(url.trim_start_matches('/')))
    }
}

impl AssetLoader for FileAssetLoader {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>>> {
        let path = self.resolve(url);
        async move {
            let path = path?;
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_loader_reads_relative_path() {
        let dir = std::env::temp_dir().join(format!("fitroom-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.bin"), [1u8, 2, 3]).unwrap();

        let loader = FileAssetLoader::new(&dir);
        assert_eq!(loader.fetch("/a.bin").await.unwrap(), vec![1, 2, 3]);
        assert!(loader.fetch("missing.bin").await.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_file_loader_rejects_remote_url() {
        let loader = FileAssetLoader::new(".");
        assert!(loader.fetch("https://cdn.example.com/a.png").await.is_err());
    }
}
