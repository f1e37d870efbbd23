// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
use std::collections::VecDeque;

/// 滑动窗口最小长度
pub const MIN_WINDOW: usize = 3;

/// 计数时间平滑器 (滑动窗口中位数)
///
/// 中位数能抵抗单帧误检/漏检,且没有滑动平均的滞后。
pub struct CountSmoother {
    history: VecDeque<u32>,
    capacity: usize,
    last_raw: Option<u32>,
}

impl CountSmoother {
    /// 创建平滑器,窗口不小于 [`MIN_WINDOW`]
    pub fn new(window: usize) -> Self {
        let capacity = window.max(MIN_WINDOW);
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            capacity,
            last_raw: None,
        }
    }

    /// 追加一个原始计数,超出容量时淘汰最旧的
    pub fn push(&mut self, raw_count: u32) {
        self.history.push_back(raw_count);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.last_raw = Some(raw_count);
    }

    /// 稳定计数: 历史中位数 (偶数长度取中间两数均值并向下取整)
    pub fn stable(&self) -> u32 {
        if self.history.is_empty() {
            return self.last_raw.unwrap_or(0);
        }

        let mut sorted: Vec<u32> = self.history.iter().copied().collect();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            sorted[mid]
        } else {
            ((sorted[mid - 1] as u64 + sorted[mid] as u64) / 2) as u32
        }
    }

    /// 清空历史 (区域重置时调用)
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_raw = None;
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
