// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/filter.rs - 置信度与关注区域过滤
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

use tracing::debug;

use crate::{
  config::{DEFAULT_MIN_CALIBRATION_OVERLAP, DEFAULT_SCORE_THRESHOLD},
  detection::{
    CalibrationRegion, DetectItem, DetectionSet, HealthWeightTable, WeightedDetection,
    WeightedDetectionSet,
  },
  geometry::fractional_overlap,
};

#[derive(Debug, Clone)]
pub struct DetectionFilter {
  score_threshold: f32,
  min_overlap: f32,
  weights: HealthWeightTable,
}

impl Default for DetectionFilter {
  fn default() -> Self {
    Self::new(HealthWeightTable::default())
  }
}

impl DetectionFilter {
  pub fn new(weights: HealthWeightTable) -> Self {
    Self {
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      min_overlap: DEFAULT_MIN_CALIBRATION_OVERLAP,
      weights,
    }
  }

  pub fn with_score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn with_min_overlap(mut self, min_overlap: f32) -> Self {
    self.min_overlap = min_overlap;
    self
  }

  pub fn weights(&self) -> &HealthWeightTable {
    &self.weights
  }

  fn passes_score(&self, item: &DetectItem) -> bool {
    item.score > self.score_threshold
  }

  fn passes_region(&self, item: &DetectItem, region: &CalibrationRegion) -> bool {
    fractional_overlap(&item.bbox, &region.coordinates) >= self.min_overlap
  }

  /// 保留置信度高于阈值、且（有标定时）落入关注区域足够多的检测项
  ///
  /// 保持原有相对顺序，并为保留下来的类别重新查表得到健康权重。
  pub fn filter(
    &self,
    set: &DetectionSet,
    calibration: Option<&CalibrationRegion>,
  ) -> WeightedDetectionSet {
    let kept = set
      .detections()
      .iter()
      .filter(|item| {
        let score_ok = self.passes_score(item);
        let region_ok = calibration.is_none_or(|region| self.passes_region(item, region));
        score_ok && region_ok
      })
      .map(|item| WeightedDetection {
        item: *item,
        health_weight: self.weights.weight(item.class_id),
      })
      .collect::<Vec<_>>();

    debug!(
      "过滤检测结果: {} -> {} (阈值 {}, 标定 {})",
      set.len(),
      kept.len(),
      self.score_threshold,
      calibration.is_some()
    );

    WeightedDetectionSet {
      items: kept.into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  const INSIDE: [f32; 4] = [0.3, 0.3, 0.4, 0.4];
  const OUTSIDE: [f32; 4] = [0.0, 0.0, 0.1, 0.1];

  #[test]
  fn score_only_without_calibration() {
    let set = DetectionSet::new(vec![
      item(2, 0.9, OUTSIDE),
      item(4, 0.66, INSIDE),
      item(5, 0.3, INSIDE),
      item(3, 0.7, INSIDE),
    ]);
    let out = DetectionFilter::default().filter(&set, None);
    let scores: Vec<f32> = out.iter().map(|d| d.item.score).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
    assert!(out.iter().all(|d| d.item.score > 0.66));
  }

  #[test]
  fn calibration_drops_outside_boxes() {
    let region = CalibrationRegion::new([0.2, 0.2, 0.8, 0.8]);
    let set = DetectionSet::new(vec![
      item(2, 0.9, OUTSIDE),
      item(4, 0.8, INSIDE),
      // 一半在区域内，低于 0.75
      item(3, 0.95, [0.6, 0.4, 1.0, 0.6]),
      // 在区域内但置信度不足
      item(2, 0.5, INSIDE),
    ]);
    let filter = DetectionFilter::default();
    let out = filter.filter(&set, Some(&region));
    assert_eq!(out.num_detections(), 1);
    assert_eq!(out.items[0].item.class_id, 4);
    assert!(
      out
        .iter()
        .all(|d| fractional_overlap(&d.item.bbox, &region.coordinates) >= 0.75)
    );
  }

  #[test]
  fn weights_follow_kept_classes() {
    let set = DetectionSet::new(vec![item(5, 0.9, INSIDE), item(2, 0.8, INSIDE)]);
    let out = DetectionFilter::default().filter(&set, None);
    let weights: Vec<f32> = out.iter().map(|d| d.health_weight).collect();
    assert_eq!(weights, vec![-0.5, 1.0]);
  }

  #[test]
  fn empty_input_is_empty_output() {
    let out = DetectionFilter::default().filter(&DetectionSet::default(), None);
    assert!(out.is_empty());
  }

  #[test]
  fn custom_thresholds() {
    let region = CalibrationRegion::new([0.2, 0.2, 0.8, 0.8]);
    let set = DetectionSet::new(vec![item(2, 0.4, [0.6, 0.4, 1.0, 0.6])]);
    let out = DetectionFilter::default()
      .with_score_threshold(0.3)
      .with_min_overlap(0.45)
      .filter(&set, Some(&region));
    assert_eq!(out.num_detections(), 1);
  }
}
