//! Temporal Smoother
//!
//! Single-frame misclassifications are common (a blink reads as fear, a
//! sarcastic sentence reads as joy). Each (session, modality) stream keeps a
//! bounded window and an exponential moving average so that one outlier can
//! move the smoothed estimate by at most `alpha` times its distance.

use neurocanvas_core::{EmotionConfig, EmotionVector};
use std::collections::VecDeque;

/// Bounded FIFO of the most recent entries. Oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct HistoryWindow<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryWindow<T> {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, returning the evicted entry if the window was full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

/// Smoothing state of one (session, modality) stream.
#[derive(Debug, Clone)]
pub struct SmoothingWindow {
    history: HistoryWindow<EmotionVector>,
    smoothed: Option<EmotionVector>,
}

impl SmoothingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: HistoryWindow::new(capacity),
            smoothed: None,
        }
    }

    /// Current smoothed estimate; `None` before the first sample.
    pub fn smoothed(&self) -> Option<&EmotionVector> {
        self.smoothed.as_ref()
    }

    /// Raw vectors that went in, oldest first.
    pub fn history(&self) -> &HistoryWindow<EmotionVector> {
        &self.history
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TemporalSmoother {
    alpha: f32,
    capacity: usize,
}

impl TemporalSmoother {
    /// `alpha` is clamped into `(0, 1]`; NaN falls back to 1 (no smoothing).
    pub fn new(alpha: f32, capacity: usize) -> Self {
        let alpha = if alpha.is_nan() {
            1.0
        } else {
            alpha.clamp(f32::EPSILON, 1.0)
        };
        Self {
            alpha,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &EmotionConfig) -> Self {
        Self::new(config.smoothing_factor, config.history_length)
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A fresh window sized for this smoother.
    pub fn window(&self) -> SmoothingWindow {
        SmoothingWindow::new(self.capacity)
    }

    /// Push `sample` into `window` and return the new smoothed vector:
    /// `alpha * sample + (1 - alpha) * previous`, or `sample` itself for
    /// the first entry.
    pub fn smooth(&self, window: &mut SmoothingWindow, sample: &EmotionVector) -> EmotionVector {
        window.history.push(*sample);
        let next = match window.smoothed {
            Some(prev) => prev.blend(sample, self.alpha),
            None => *sample,
        };
        window.smoothed = Some(next);
        next
    }
}
