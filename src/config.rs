// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/config.rs - 引擎配置
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

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.66;
pub const DEFAULT_MIN_CALIBRATION_OVERLAP: f32 = 0.75;
pub const DEFAULT_WARMUP: usize = 3;
pub const DEFAULT_POLYFIT_DEGREE: usize = 1;
pub const DEFAULT_WINDOW_SIZE_SECS: i64 = 60 * 5;
pub const DEFAULT_WINDOW_PERIOD_SECS: i64 = 30;

/// 窗口化健康分析引擎的配置
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  /// 置信度阈值，严格大于才保留
  pub score_threshold: f32,
  /// 检测框落入关注区域的最小比例
  pub min_calibration_overlap: f32,
  /// 窗口内记录数少于该值时不输出趋势
  pub warmup: usize,
  /// 多项式拟合阶数
  pub polyfit_degree: usize,
  /// 滑动窗口长度（秒）
  pub window_size_secs: i64,
  /// 滑动窗口步长（秒）
  pub window_period_secs: i64,
  /// 窗口结束后仍接受迟到数据的时长（秒）
  pub allowed_lateness_secs: i64,
  /// 水位线推进时是否提前触发
  pub early_firing: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      min_calibration_overlap: DEFAULT_MIN_CALIBRATION_OVERLAP,
      warmup: DEFAULT_WARMUP,
      polyfit_degree: DEFAULT_POLYFIT_DEGREE,
      window_size_secs: DEFAULT_WINDOW_SIZE_SECS,
      window_period_secs: DEFAULT_WINDOW_PERIOD_SECS,
      allowed_lateness_secs: 0,
      early_firing: true,
    }
  }
}

impl EngineConfig {
  pub fn with_score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn with_min_calibration_overlap(mut self, overlap: f32) -> Self {
    self.min_calibration_overlap = overlap;
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }

  pub fn with_polyfit_degree(mut self, degree: usize) -> Self {
    self.polyfit_degree = degree;
    self
  }

  pub fn with_window(mut self, size_secs: i64, period_secs: i64) -> Self {
    self.window_size_secs = size_secs;
    self.window_period_secs = period_secs;
    self
  }

  pub fn with_allowed_lateness(mut self, secs: i64) -> Self {
    self.allowed_lateness_secs = secs;
    self
  }

  pub fn with_early_firing(mut self, early: bool) -> Self {
    self.early_firing = early;
    self
  }
}
