// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/window.rs - 窗口分配与触发器
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 时间窗口 [start, end)，单位为秒
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
  pub start: i64,
  pub end: i64,
}

impl Window {
  pub fn contains(&self, ts: f64) -> bool {
    self.start as f64 <= ts && ts < self.end as f64
  }
}

impl fmt::Display for Window {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}, {})", self.start, self.end)
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WindowError {
  #[error("窗口长度必须为正数: {0}")]
  InvalidSize(i64),
  #[error("窗口步长必须为正数: {0}")]
  InvalidPeriod(i64),
  #[error("窗口步长 {period} 大于窗口长度 {size}")]
  PeriodLargerThanSize { size: i64, period: i64 },
}

pub trait WindowAssigner {
  /// 返回包含该时间戳的全部窗口
  fn assign(&self, ts: f64) -> Vec<Window>;
}

/// 滑动窗口：起点为步长的整数倍，每个时间戳落入 size / period 个窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindows {
  size: i64,
  period: i64,
}

impl SlidingWindows {
  pub fn new(size: i64, period: i64) -> Result<Self, WindowError> {
    if size <= 0 {
      return Err(WindowError::InvalidSize(size));
    }
    if period <= 0 {
      return Err(WindowError::InvalidPeriod(period));
    }
    if period > size {
      return Err(WindowError::PeriodLargerThanSize { size, period });
    }
    Ok(Self { size, period })
  }

  pub fn size(&self) -> i64 {
    self.size
  }

  pub fn period(&self) -> i64 {
    self.period
  }
}

impl SlidingWindows {
  /// 时间戳超出 i64 秒可表示的范围时返回 `None`
  fn try_assign(&self, ts: f64) -> Option<Vec<Window>> {
    if !ts.is_finite() {
      return None;
    }
    let index = (ts / self.period as f64).floor();
    if index < i64::MIN as f64 || index >= i64::MAX as f64 {
      return None;
    }
    let mut start = (index as i64).checked_mul(self.period)?;
    let mut windows = Vec::with_capacity((self.size / self.period) as usize);
    loop {
      let end = start.checked_add(self.size)?;
      if end as f64 <= ts {
        break;
      }
      windows.push(Window { start, end });
      start = start.checked_sub(self.period)?;
    }
    Some(windows)
  }
}

impl WindowAssigner for SlidingWindows {
  fn assign(&self, ts: f64) -> Vec<Window> {
    self.try_assign(ts).unwrap_or_default()
  }
}

/// 固定窗口：互不重叠且首尾相接
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindows {
  inner: SlidingWindows,
}

impl FixedWindows {
  pub fn new(size: i64) -> Result<Self, WindowError> {
    Ok(Self {
      inner: SlidingWindows::new(size, size)?,
    })
  }
}

impl WindowAssigner for FixedWindows {
  fn assign(&self, ts: f64) -> Vec<Window> {
    self.inner.assign(ts)
  }
}

/// 触发时机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaneTiming {
  Early,
  OnTime,
  Late,
}

/// 一次窗口触发（pane）的信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneInfo {
  pub index: u64,
  pub is_first: bool,
  pub is_last: bool,
  pub timing: PaneTiming,
}

impl PaneInfo {
  pub fn new(index: u64, is_last: bool, timing: PaneTiming) -> Self {
    Self {
      index,
      is_first: index == 0,
      is_last,
      timing,
    }
  }
}

/// 触发器所见的窗口状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowState {
  pub window: Window,
  /// 累积的元素数
  pub element_count: usize,
  /// 自上次触发以来新到达的元素数
  pub pending_count: usize,
  pub panes_fired: u64,
  pub watermark: f64,
  /// 水位线已越过窗口结束时间加允许迟到时长，这是最后一次触发机会
  pub closing: bool,
}

pub trait Trigger {
  fn should_fire(&self, state: &WindowState) -> bool;
}

/// 只在窗口关闭时触发一次
#[derive(Debug, Clone, Copy, Default)]
pub struct AfterWatermark;

impl Trigger for AfterWatermark {
  fn should_fire(&self, state: &WindowState) -> bool {
    state.closing && state.element_count > 0
  }
}

/// 有新数据时提前触发，窗口关闭时再做最终触发
#[derive(Debug, Clone, Copy, Default)]
pub struct EarlyAndFinal;

impl Trigger for EarlyAndFinal {
  fn should_fire(&self, state: &WindowState) -> bool {
    state.element_count > 0 && (state.closing || state.pending_count > 0)
  }
}
