// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测计数系统 (Detection & Counting)
///
/// - Detector: 目标检测接口
/// - Reducer:  类别/区域过滤 → 原始计数
/// - Smoother: 滑动中位数 → 稳定计数
pub mod detector;
pub mod names;
pub mod reducer;
pub mod smoother;
pub mod types;

pub use detector::Detector;
pub use names::ClassNames;
pub use reducer::{reduce, Reduction};
pub use smoother::CountSmoother;
pub use types::{ClassFilter, Detection, FilteredDetection, InferenceParams, ReduceOptions};
