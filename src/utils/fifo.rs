// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 定长先进先出队列 (Bounded FIFO)
//!
//! 满时淘汰最旧元素, 容量永远不会被超出。用于置信度与位置的滑动平均。

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BoundedFifo<T> {
    deque: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedFifo<T> {
    /// `capacity` 为0时按1处理, 保证 push 之后至少保留当前值
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            deque: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 压入新值, 返回被淘汰的最旧值
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.deque.pop_front()
        } else {
            None
        };
        self.deque.push_back(item);
        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.deque.len() == self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn clear(&mut self) {
        self.deque.clear()
    }

    /// 从最旧到最新
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &'_ T> {
        self.deque.iter()
    }
}

impl BoundedFifo<f32> {
    /// 算术平均, 空队列返回 None
    pub fn mean(&self) -> Option<f32> {
        if self.deque.is_empty() {
            return None;
        }
        let sum: f32 = self.deque.iter().sum();
        Some(sum / self.deque.len() as f32)
    }
}
