// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/trend.rs - 会话健康趋势聚合
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

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
  config::{DEFAULT_POLYFIT_DEGREE, DEFAULT_WARMUP},
  record::{SessionMetadata, WindowedHealthRecord},
  window::Window,
};

mod polyfit;
pub use self::polyfit::{FitError, Polynomial, Root, fit};

/// 单个 (会话, 窗口) 的健康趋势
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTrend {
  pub session_id: String,
  pub metadata: SessionMetadata,
  pub window: Window,
  /// 参与累计的时间戳（升序、去重）
  pub ts: Vec<f64>,
  /// 每个时间戳处的累计健康分
  pub cumsum: Vec<f64>,
  pub poly_coef: Vec<f64>,
  pub poly_domain: [f64; 2],
  pub poly_roots: Vec<Root>,
  pub poly_degree: usize,
  pub health_score: Vec<f32>,
  pub health_weight: Vec<f32>,
  pub detection_class: Vec<u32>,
  pub detection_score: Vec<f32>,
}

impl HealthTrend {
  /// 一阶拟合时的斜率
  pub fn slope(&self) -> Option<f64> {
    self.poly_coef.get(1).copied()
  }
}

fn record_order(a: &WindowedHealthRecord, b: &WindowedHealthRecord) -> Ordering {
  a.ts
    .total_cmp(&b.ts)
    .then(a.detection_class.cmp(&b.detection_class))
    .then(a.detection_score.total_cmp(&b.detection_score))
    .then(a.health_weight.total_cmp(&b.health_weight))
}

/// 按时间戳聚合：正权重取最大健康分，负权重取最小健康分，两者相加
///
/// 只有存在非零权重记录的时间戳才会出现在结果中。输入需已按时间排序。
pub fn per_timestamp_health(sorted: &[&WindowedHealthRecord]) -> Vec<(f64, f64)> {
  let mut out: Vec<(f64, f64)> = Vec::new();
  for group in sorted.chunk_by(|a, b| a.ts == b.ts) {
    let positive = group
      .iter()
      .filter(|r| r.health_weight > 0.0)
      .map(|r| r.health_score as f64)
      .reduce(f64::max);
    let negative = group
      .iter()
      .filter(|r| r.health_weight < 0.0)
      .map(|r| r.health_score as f64)
      .reduce(f64::min);
    if positive.is_none() && negative.is_none() {
      continue;
    }
    out.push((
      group[0].ts,
      positive.unwrap_or(0.0) + negative.unwrap_or(0.0),
    ));
  }
  out
}

/// 累计和
pub fn cumulative(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
  values
    .into_iter()
    .scan(0.0, |acc, v| {
      *acc += v;
      Some(*acc)
    })
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendAggregator {
  warmup: usize,
  degree: usize,
}

impl Default for TrendAggregator {
  fn default() -> Self {
    Self {
      warmup: DEFAULT_WARMUP,
      degree: DEFAULT_POLYFIT_DEGREE,
    }
  }
}

impl TrendAggregator {
  pub fn new(warmup: usize, degree: usize) -> Self {
    Self { warmup, degree }
  }

  pub fn warmup(&self) -> usize {
    self.warmup
  }

  pub fn degree(&self) -> usize {
    self.degree
  }

  /// 计算一个窗口的健康趋势
  ///
  /// 记录数不足或拟合失败时返回 `None`；失败只记录日志，不向上传播。
  /// 同一组记录无论到达顺序如何，结果都完全一致。
  pub fn aggregate(
    &self,
    key: &str,
    window: Window,
    records: &[WindowedHealthRecord],
  ) -> Option<HealthTrend> {
    if records.len() < self.warmup {
      debug!(
        "会话 {} 窗口 {} 记录数 {} 少于预热数 {}，跳过",
        key,
        window,
        records.len(),
        self.warmup
      );
      return None;
    }

    let mut sorted: Vec<&WindowedHealthRecord> = records.iter().collect();
    sorted.sort_by(|a, b| record_order(a, b));

    let per_ts = per_timestamp_health(&sorted);
    let ts: Vec<f64> = per_ts.iter().map(|(t, _)| *t).collect();
    let cumsum = cumulative(per_ts.iter().map(|(_, v)| *v));

    let poly = match fit(&ts, &cumsum, self.degree) {
      Ok(poly) => poly,
      Err(e) => {
        error!(
          "会话 {} 窗口 {} 趋势拟合失败 (记录数 {}, 时间点 {}): {}",
          key,
          window,
          records.len(),
          ts.len(),
          e
        );
        return None;
      }
    };

    info!(
      "会话 {} 输出健康趋势 window_start={} window_end={}",
      key, window.start, window.end
    );

    Some(HealthTrend {
      session_id: key.to_string(),
      metadata: sorted[0].metadata.clone(),
      window,
      poly_coef: poly.coefficients().to_vec(),
      poly_domain: poly.domain(),
      poly_roots: poly.roots(),
      poly_degree: poly.degree(),
      ts,
      cumsum,
      health_score: sorted.iter().map(|r| r.health_score).collect(),
      health_weight: sorted.iter().map(|r| r.health_weight).collect(),
      detection_class: sorted.iter().map(|r| r.detection_class).collect(),
      detection_score: sorted.iter().map(|r| r.detection_score).collect(),
    })
  }
}
