// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测数据结构定义
/// Data structures for zone counting
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

// ========== 公共常量 ==========

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box)
///
/// 坐标为原图像素坐标,检测器不保证 x1<x2 / y1<y2。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    /// 整数化后的框 (截断取整)
    pub fn int_box(&self) -> (i32, i32, i32, i32) {
        (
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        )
    }

    /// 中心点: 整数框的中点 (向下取整)
    pub fn center(&self) -> Point {
        let (x1, y1, x2, y2) = self.int_box();
        // i64 求和,极端坐标下不溢出
        let mid = |a: i32, b: i32| (a as i64 + b as i64).div_euclid(2) as i32;
        Point::new(mid(x1, x2), mid(y1, y2))
    }

    /// 规范化后的框 (左上, 右下)
    pub fn normalized(&self) -> (Point, Point) {
        let (x1, y1, x2, y2) = self.int_box();
        (
            Point::new(x1.min(x2), y1.min(y2)),
            Point::new(x1.max(x2), y1.max(y2)),
        )
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).abs() * (self.y2 - self.y1).abs()
    }

    pub fn intersection_area(&self, another: &Detection) -> f32 {
        let l = self.x1.min(self.x2).max(another.x1.min(another.x2));
        let r = self.x1.max(self.x2).min(another.x1.max(another.x2));
        let t = self.y1.min(self.y2).max(another.y1.min(another.y2));
        let b = self.y1.max(self.y2).min(another.y1.max(another.y2));
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &Detection) -> f32 {
        let inter = self.intersection_area(another);
        let union = self.area() + another.area() - inter;
        if union <= 0. {
            0.
        } else {
            inter / union
        }
    }
}

/// 经区域过滤后的检测 (保留绘制所需信息)
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredDetection {
    pub detection: Detection,
    pub center: Point,
    /// 中心点是否落在区域内 (无区域时为 true)
    pub inside: bool,
}

/// 推理参数,原样交给检测器
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub conf: f32,
    pub iou: f32,
    pub size: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            conf: 0.35,
            iou: 0.45,
            size: INF_SIZE,
        }
    }
}

/// 类别过滤
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ClassFilter {
    /// 不限类别
    #[default]
    All,
    /// 仅统计这些类别
    Only(BTreeSet<u32>),
}

impl ClassFilter {
    pub fn only(ids: impl IntoIterator<Item = u32>) -> Self {
        ClassFilter::Only(ids.into_iter().collect())
    }

    pub fn allows(&self, class_id: u32) -> bool {
        match self {
            ClassFilter::All => true,
            ClassFilter::Only(ids) => ids.contains(&class_id),
        }
    }

    /// 过滤集合为空时什么都不会被统计
    pub fn is_empty(&self) -> bool {
        matches!(self, ClassFilter::Only(ids) if ids.is_empty())
    }
}

/// 计数选项
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceOptions {
    /// 只统计区域内的目标
    pub only_inside: bool,
    /// 区域外目标仍保留在输出中 (inside=false, 调试显示用)
    pub keep_outside: bool,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            only_inside: true,
            keep_outside: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_floors_like_integer_midpoint() {
        let d = Detection::new(0, 0.9, 10.7, 20.2, 21.9, 31.0);
        // int: (10, 20, 21, 31) → ((31)//2, (51)//2)
        assert_eq!(d.center(), Point::new(15, 25));
    }

    #[test]
    fn test_center_tolerates_swapped_corners() {
        let a = Detection::new(0, 0.9, 0.0, 0.0, 100.0, 50.0);
        let b = Detection::new(0, 0.9, 100.0, 50.0, 0.0, 0.0);
        assert_eq!(a.center(), b.center());
        assert_eq!(a.normalized(), b.normalized());
        assert!((a.area() - b.area()).abs() < f32::EPSILON);
    }

    #[test]
    fn test_center_with_extreme_coordinates() {
        let d = Detection::new(0, 0.9, f32::MAX, f32::MAX, f32::MAX, -f32::MAX);
        // as i32 饱和到 i32::MAX / i32::MIN
        assert_eq!(d.center(), Point::new(i32::MAX, -1));
    }

    #[test]
    fn test_iou() {
        let a = Detection::new(0, 0.9, 0.0, 0.0, 10.0, 10.0);
        let b = Detection::new(0, 0.8, 5.0, 0.0, 15.0, 10.0);
        let iou = a.iou(&b);
        assert!((iou - 50.0 / 150.0).abs() < 1e-5);
        let far = Detection::new(0, 0.8, 50.0, 50.0, 60.0, 60.0);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_class_filter() {
        assert!(ClassFilter::All.allows(42));
        let f = ClassFilter::only([0, 67]);
        assert!(f.allows(67));
        assert!(!f.allows(1));
        assert!(!f.is_empty());
        assert!(ClassFilter::only([]).is_empty());
    }
}
