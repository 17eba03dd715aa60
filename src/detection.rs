// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/detection.rs - 检测结果与健康权重定义
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

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::record::ImageMetadata;

/// 单个检测框，坐标归一化到 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

/// 单张图像的推理结果
///
/// 推理端可能会填充定长数组，只有前 `num_detections` 项有效。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSet {
  pub num_detections: usize,
  pub items: Box<[DetectItem]>,
}

impl DetectionSet {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self {
      num_detections: items.len(),
      items: items.into_boxed_slice(),
    }
  }

  /// 有效检测项
  pub fn detections(&self) -> &[DetectItem] {
    let n = self.num_detections.min(self.items.len());
    &self.items[..n]
  }

  pub fn len(&self) -> usize {
    self.detections().len()
  }

  pub fn is_empty(&self) -> bool {
    self.detections().is_empty()
  }
}

/// 附带健康权重的检测项
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedDetection {
  pub item: DetectItem,
  pub health_weight: f32,
}

/// 过滤后的检测结果，权重已按类别表重新计算
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedDetectionSet {
  pub items: Box<[WeightedDetection]>,
}

impl WeightedDetectionSet {
  pub fn num_detections(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &WeightedDetection> {
    self.items.iter()
  }
}

/// 推理协作方交付的一帧：图像元数据加检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedImage {
  pub metadata: ImageMetadata,
  pub detections: DetectionSet,
}

/// 设备标定的关注区域 [x0, y0, x1, y1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRegion {
  pub coordinates: [f32; 4],
}

impl CalibrationRegion {
  pub fn new(coordinates: [f32; 4]) -> Self {
    Self { coordinates }
  }

  /// 检查区域是否合法，返回不合法的原因
  pub fn validate(&self) -> Result<(), String> {
    let [x0, y0, x1, y1] = self.coordinates;
    if self.coordinates.iter().any(|v| !v.is_finite()) {
      return Err(format!("坐标包含非有限值: {:?}", self.coordinates));
    }
    if x1 <= x0 || y1 <= y0 {
      return Err(format!("区域为空或坐标颠倒: {:?}", self.coordinates));
    }
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum WeightTableError {
  #[error("读取权重表失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("解析权重表失败: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("类别 {0} 的权重不是有限值")]
  NonFinite(u32),
}

/// 类别到健康权重的映射，正值表示健康，负值表示异常
#[derive(Debug, Clone, PartialEq)]
pub struct HealthWeightTable {
  weights: HashMap<u32, f32>,
}

impl Default for HealthWeightTable {
  fn default() -> Self {
    // 0: background, 1: nozzle, 2: print, 3: raft, 4: adhesion, 5: spaghetti
    Self::from_pairs([
      (0, 0.0),
      (1, 0.0),
      (2, 1.0),
      (3, 1.0),
      (4, -0.5),
      (5, -0.5),
    ])
  }
}

impl HealthWeightTable {
  pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f32)>) -> Self {
    Self {
      weights: pairs.into_iter().collect(),
    }
  }

  /// 从 JSON 文件加载，格式为 `{ "<class_id>": <weight>, ... }`
  pub fn from_json_file(path: &Path) -> Result<Self, WeightTableError> {
    let text = std::fs::read_to_string(path)?;
    let table = Self::from_json_str(&text)?;
    info!("已加载健康权重表: {} ({} 个类别)", path.display(), table.len());
    Ok(table)
  }

  pub fn from_json_str(text: &str) -> Result<Self, WeightTableError> {
    let weights: HashMap<u32, f32> = serde_json::from_str(text)?;
    if let Some((class_id, _)) = weights.iter().find(|(_, w)| !w.is_finite()) {
      return Err(WeightTableError::NonFinite(*class_id));
    }
    Ok(Self { weights })
  }

  pub fn get(&self, class_id: u32) -> Option<f32> {
    self.weights.get(&class_id).copied()
  }

  /// 查询权重，未知类别按 0 处理
  pub fn weight(&self, class_id: u32) -> f32 {
    match self.get(class_id) {
      Some(w) => w,
      None => {
        warn!("未知类别 {}，健康权重按 0 处理", class_id);
        0.0
      }
    }
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }
}
