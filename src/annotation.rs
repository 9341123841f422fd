//! 标注点存储
//!
//! 每张图一组带标签的2D点，导出为 annotations.json

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MAX_LABEL;

#[derive(Debug, Error, PartialEq)]
pub enum AnnotationError {
    /// 标签重复，拒绝输入后重新等待
    #[error("label {0} already placed on this image")]
    DuplicateLabel(u8),
    #[error("label {0} out of range, only single digits 0-9 are accepted")]
    LabelOutOfRange(u8),
}

/// 带标签的2D点，JSON中为 [x, y, label]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64, u8)", into = "(f64, f64, u8)")]
pub struct LabeledPoint {
    pub x: f64,
    pub y: f64,
    pub label: u8,
}

impl From<(f64, f64, u8)> for LabeledPoint {
    fn from((x, y, label): (f64, f64, u8)) -> Self {
        Self { x, y, label }
    }
}

impl From<LabeledPoint> for (f64, f64, u8) {
    fn from(p: LabeledPoint) -> Self {
        (p.x, p.y, p.label)
    }
}

pub type AnnotationSet = Vec<LabeledPoint>;

/// 所有图像的标注，保持枚举顺序
/// None 表示该图像没有被标注过
#[derive(Debug, Default, PartialEq)]
pub struct AnnotationCollection {
    entries: Vec<(String, Option<AnnotationSet>)>,
}

impl AnnotationCollection {
    /// 预先登记所有图像，中途退出时文件中也有完整的键
    pub fn pre_register(&mut self, image_id: &str) {
        self.entries.push((image_id.to_string(), None));
    }

    pub fn set(&mut self, image_id: &str, set: AnnotationSet) {
        match self.entries.iter_mut().find(|(id, _)| id == image_id) {
            Some(entry) => entry.1 = Some(set),
            None => self.entries.push((image_id.to_string(), Some(set))),
        }
    }

    pub fn get(&self, image_id: &str) -> Option<&AnnotationSet> {
        self.entries
            .iter()
            .find(|(id, _)| id == image_id)
            .and_then(|(_, set)| set.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Option<AnnotationSet>)> {
        self.entries.iter()
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut map = serde_json::Map::new();
        for (image_id, set) in &self.entries {
            let value = match set {
                Some(set) => serde_json::to_value(set)?,
                None => serde_json::Value::Null,
            };
            map.insert(image_id.clone(), value);
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("create annotation file {:?}", path))?;
        serde_json::to_writer_pretty(file, &serde_json::Value::Object(map))?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open annotation file {:?}", path))?;
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_reader(file)?;

        let mut entries = vec![];
        for (image_id, value) in map {
            let set = match value {
                serde_json::Value::Null => None,
                value => Some(serde_json::from_value(value)?),
            };
            entries.push((image_id, set));
        }
        Ok(Self { entries })
    }
}

/// 标注会话状态：当前图像的工作点列表 + 已完成图像的标注
#[derive(Debug, Default)]
pub struct AnnotationStore {
    working: AnnotationSet,
    collection: AnnotationCollection,
}

impl AnnotationStore {
    pub fn new(image_ids: &[String]) -> Self {
        let mut collection = AnnotationCollection::default();
        for id in image_ids {
            collection.pre_register(id);
        }
        Self {
            working: vec![],
            collection,
        }
    }

    /// 标签重复或超出 0-9 时拒绝，不做任何修改
    pub fn add_point(&mut self, x: f64, y: f64, label: u8) -> Result<(), AnnotationError> {
        if label > MAX_LABEL {
            return Err(AnnotationError::LabelOutOfRange(label));
        }
        if self.labels_used().contains(&label) {
            return Err(AnnotationError::DuplicateLabel(label));
        }
        self.working.push(LabeledPoint { x, y, label });
        Ok(())
    }

    /// 删除最近添加的点，空集合时不做任何事
    pub fn remove_last(&mut self) -> Option<LabeledPoint> {
        self.working.pop()
    }

    pub fn labels_used(&self) -> HashSet<u8> {
        self.working.iter().map(|p| p.label).collect()
    }

    pub fn working_set(&self) -> &AnnotationSet {
        &self.working
    }

    /// 当前工作集存入集合，清空后开始下一张图
    pub fn finalize_image(&mut self, image_id: &str) {
        let set = std::mem::take(&mut self.working);
        self.collection.set(image_id, set);
    }

    pub fn export(&self, path: &Path) -> anyhow::Result<()> {
        self.collection.save(path)
    }
}
