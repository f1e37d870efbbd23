// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测归约 (Detection Reducer)
//!
//! 单帧检测结果 → 类别过滤 → 区域包含测试 → (原始计数, 过滤后检测列表)

use super::types::{ClassFilter, Detection, FilteredDetection, ReduceOptions};
use crate::geometry::{contains, Region};

/// 单帧归约结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reduction {
    pub raw_count: u32,
    pub detections: Vec<FilteredDetection>,
}

/// 对一帧检测结果做类别与区域过滤
pub fn reduce(
    detections: &[Detection],
    classes: &ClassFilter,
    region: Option<&Region>,
    options: ReduceOptions,
) -> Reduction {
    let mut out = Reduction::default();

    for det in detections {
        if !classes.allows(det.class_id) {
            continue;
        }

        let center = det.center();
        let inside = contains(region, center);

        if options.only_inside && !inside {
            if options.keep_outside {
                out.detections.push(FilteredDetection {
                    detection: det.clone(),
                    center,
                    inside: false,
                });
            }
            continue;
        }

        out.raw_count += 1;
        out.detections.push(FilteredDetection {
            detection: det.clone(),
            center,
            inside,
        });
    }

    out
}
