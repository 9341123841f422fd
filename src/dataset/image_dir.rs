use std::path::Path;

use anyhow::Context;

use super::DatasetTrait;
use crate::config::IMAGE_EXTENSIONS;

/// 平铺的图像目录，文件名排序保证稳定的顺序
#[derive(Debug, Default)]
pub struct ImageDirDataset {
    pub images: Vec<(String, String)>, // name, full path
}

impl ImageDirDataset {
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let images = Self::read_image_dir(Path::new(path))?;
        Ok(Self { images })
    }

    fn read_image_dir(path: &Path) -> anyhow::Result<Vec<(String, String)>> {
        let entries = std::fs::read_dir(path)
            .with_context(|| format!("read image dir {:?}", path))?;

        let mut images = vec![];
        for entry in entries {
            let entry = entry?;
            let file_path = entry.path();
            let is_image = file_path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let full = file_path.to_string_lossy().to_string();
            images.push((name, full));
        }
        // 按文件名排序
        images.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(images)
    }
}

impl DatasetTrait for ImageDirDataset {
    fn image_list(&self) -> &Vec<(String, String)> {
        &self.images
    }
}
