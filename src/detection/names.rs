// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 类别名称表 (Class name table)
//!
//! 启动时从模型元数据构建一次,之后只读。
//! 同一名称可能对应多个类别ID,按名称过滤时全部纳入。

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::types::ClassFilter;

/// 过滤器中表示 "不限类别" 的关键字
pub const ALL_CLASSES: &str = "all";

/// COCO 80类 (模型元数据缺失时使用)
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

// 元数据格式: {0: 'person', 1: 'bicycle', ...}
static NAME_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\d+)\s*:\s*(['"])([^'"]*)(['"])"#).expect("名称正则无效")
});

/// 类别ID → 名称 映射
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNames {
    names: BTreeMap<u32, String>,
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::coco()
    }
}

impl ClassNames {
    pub fn new(names: BTreeMap<u32, String>) -> Self {
        Self { names }
    }

    pub fn coco() -> Self {
        Self::from_list(COCO_CLASSES.iter().copied())
    }

    /// 按顺序编号
    pub fn from_list<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(i, n)| (i as u32, n.into()))
                .collect(),
        }
    }

    /// 解析 ultralytics 导出的 `names` 元数据
    pub fn parse_metadata(raw: &str) -> Option<Self> {
        let names: BTreeMap<u32, String> = NAME_ENTRY
            .captures_iter(raw)
            .filter_map(|cap| {
                let id = cap.get(1)?.as_str().parse::<u32>().ok()?;
                let name = cap.get(3)?.as_str().to_string();
                Some((id, name))
            })
            .collect();

        if names.is_empty() {
            None
        } else {
            Some(Self { names })
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// 绘制用标签,未知ID显示数字
    pub fn label(&self, id: u32) -> String {
        self.get(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }

    /// 所有名为 `name` 的类别ID
    pub fn ids_of(&self, name: &str) -> BTreeSet<u32> {
        self.names
            .iter()
            .filter(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
            .collect()
    }

    /// 名称列表 → 类别过滤器
    ///
    /// 空列表或包含 "all" 表示不限类别;未知名称记录警告,
    /// 全部未知时返回空集合 (什么都不统计)。
    pub fn resolve<S: AsRef<str>>(&self, wanted: &[S]) -> ClassFilter {
        if wanted.is_empty() || wanted.iter().any(|w| w.as_ref() == ALL_CLASSES) {
            return ClassFilter::All;
        }

        let mut ids = BTreeSet::new();
        for name in wanted {
            let found = self.ids_of(name.as_ref());
            if found.is_empty() {
                warn!("⚠️ 模型中没有类别 {:?}", name.as_ref());
            }
            ids.extend(found);
        }
        ClassFilter::Only(ids)
    }
}
