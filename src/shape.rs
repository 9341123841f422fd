//! 3D参考形状
//!
//! 每个形状一个json文件，文件名就是形状名

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// 标签（数字的字符串形式）到3D坐标的映射
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shape3D(pub HashMap<String, [f64; 3]>);

impl Shape3D {
    pub fn point(&self, label: u8) -> Option<[f64; 3]> {
        self.0.get(&label.to_string()).copied()
    }
}

#[derive(Debug, Default)]
pub struct ShapeLibrary {
    pub shapes: HashMap<String, Shape3D>,
}

impl ShapeLibrary {
    /// 读取目录下所有形状文件，损坏的文件跳过并告警
    pub fn load_dir(path: &str) -> anyhow::Result<Self> {
        let path = Path::new(path);
        let entries = std::fs::read_dir(path)
            .with_context(|| format!("read shape dir {:?}", path))?;

        let mut shapes = HashMap::new();
        for entry in entries {
            let entry = entry?;
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = match file_path.file_stem().and_then(|s| s.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            match Self::load_file(&file_path) {
                Ok(shape) => {
                    shapes.insert(name, shape);
                }
                Err(e) => {
                    log::warn!("skip shape file {:?}: {}", file_path, e);
                }
            }
        }
        Ok(Self { shapes })
    }

    fn load_file(path: &Path) -> anyhow::Result<Shape3D> {
        let file = std::fs::File::open(path)?;
        let shape = serde_json::from_reader(file)?;
        Ok(shape)
    }

    pub fn get(&self, name: &str) -> Option<&Shape3D> {
        self.shapes.get(name)
    }
}
