// src/timing.rs

//! 模拟人类操作节奏的随机时间源。
//!
//! 所有随机量都来自同一个可注入种子的 [`StdRng`]，测试中可以用
//! [`TimingPolicy::seeded`] 得到确定的序列。

use crate::{
    constants::pacing,
    error::AppResult,
    utils,
};
use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{sync::Mutex, time::Duration};
use tokio_util::sync::CancellationToken;

/// 闭区间延迟范围 (秒)。`min > max` 时会被交换。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min_secs: 0.0, max_secs: 0.0 };

    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let (lo, hi) = if min_secs <= max_secs { (min_secs, max_secs) } else { (max_secs, min_secs) };
        let cap = pacing::MAX_DELAY_SECS as f64;
        Self {
            min_secs: lo.max(0.0).min(cap),
            max_secs: hi.max(0.0).min(cap),
        }
    }
}

impl From<(f64, f64)> for DelayRange {
    fn from((min, max): (f64, f64)) -> Self {
        DelayRange::new(min, max)
    }
}

pub struct TimingPolicy {
    rng: Mutex<StdRng>,
    /// 所有延迟的缩放系数，1.0 为真实节奏
    scale: f64,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingPolicy {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
            scale: 1.0,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            scale: 1.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale.max(0.0);
        self
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *rng)
    }

    /// 在 [min, max] 内均匀采样一个延迟。
    pub fn sample_delay(&self, range: impl Into<DelayRange>) -> Duration {
        let range = range.into();
        let secs = if range.max_secs > range.min_secs {
            self.with_rng(|rng| rng.random_range(range.min_secs..=range.max_secs))
        } else {
            range.min_secs
        };
        utils::clamped_secs(secs * self.scale, pacing::MAX_DELAY)
    }

    /// 在 [min, max] 内均匀采样一个时间间隔 (用于 IP 轮换周期)。
    pub fn sample_interval(&self, min: Duration, max: Duration) -> Duration {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        if lo == hi {
            return lo;
        }
        let millis = self.with_rng(|rng| rng.random_range(lo.as_millis()..=hi.as_millis()));
        Duration::from_millis(millis as u64)
    }

    /// 随机延迟并等待，可被取消。
    pub async fn pause(&self, range: impl Into<DelayRange>, cancel: &CancellationToken) -> AppResult<Duration> {
        let delay = self.sample_delay(range);
        debug!("随机延迟: {:.2}s", delay.as_secs_f64());
        utils::cancellable_sleep(cancel, delay).await?;
        Ok(delay)
    }

    pub fn scroll_distance(&self) -> i64 {
        let (lo, hi) = pacing::SCROLL_DISTANCE;
        self.with_rng(|rng| rng.random_range(lo..=hi))
    }

    pub fn scroll_steps(&self) -> u32 {
        let (lo, hi) = pacing::SCROLL_STEPS;
        self.with_rng(|rng| rng.random_range(lo..=hi))
    }

    /// 页面范围内的随机指针位置，留出边距。
    pub fn pointer_target(&self, width: u32, height: u32) -> (u32, u32) {
        let margin = pacing::POINTER_MARGIN;
        let pick = |rng: &mut StdRng, extent: u32| {
            if extent > margin * 2 {
                rng.random_range(margin..=extent - margin)
            } else {
                rng.random_range(0..=extent)
            }
        };
        self.with_rng(|rng| {
            let x = pick(&mut *rng, width);
            let y = pick(&mut *rng, height);
            (x, y)
        })
    }

    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.with_rng(|rng| rng.random_range(0..items.len()));
        items.get(idx)
    }
}
