// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/record.rs - 元数据与窗口化健康记录
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

use serde::{Deserialize, Serialize};

use crate::{detection::WeightedDetectionSet, window::Window};

/// 推理端随图像一同上报的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
  /// 事件时间（Unix 秒）
  pub ts: f64,
  pub session_id: String,
  pub user_id: u64,
  pub device_id: u64,
  #[serde(default)]
  pub cloud_device_id: Option<u64>,
  #[serde(default)]
  pub client_version: String,
}

/// 会话标识加上产生该输出的窗口范围，仅用于追溯
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
  pub session_id: String,
  pub user_id: u64,
  pub device_id: u64,
  pub cloud_device_id: Option<u64>,
  pub client_version: String,
  pub window_start: Option<i64>,
  pub window_end: Option<i64>,
}

impl SessionMetadata {
  pub fn from_image(image: &ImageMetadata, window: Option<Window>) -> Self {
    Self {
      session_id: image.session_id.clone(),
      user_id: image.user_id,
      device_id: image.device_id,
      cloud_device_id: image.cloud_device_id,
      client_version: image.client_version.clone(),
      window_start: window.map(|w| w.start),
      window_end: window.map(|w| w.end),
    }
  }

  /// 去掉窗口信息，只保留身份字段
  pub fn without_window(&self) -> Self {
    Self {
      window_start: None,
      window_end: None,
      ..self.clone()
    }
  }
}

/// 每个检测项一行的窗口化健康记录
///
/// `health_score` 恒等于 `health_weight * detection_score`，由 [`explode`] 构造。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedHealthRecord {
  pub metadata: SessionMetadata,
  pub ts: f64,
  pub session_id: String,
  pub detection_score: f32,
  pub detection_class: u32,
  pub health_weight: f32,
  pub health_score: f32,
}

impl WindowedHealthRecord {
  pub fn window(&self) -> Option<Window> {
    match (self.metadata.window_start, self.metadata.window_end) {
      (Some(start), Some(end)) => Some(Window { start, end }),
      _ => None,
    }
  }
}

/// 将一张图像过滤后的检测结果展开为逐检测项的记录，保持输入顺序
pub fn explode(
  set: &WeightedDetectionSet,
  image: &ImageMetadata,
  window: Window,
) -> Vec<WindowedHealthRecord> {
  let metadata = SessionMetadata::from_image(image, Some(window));
  set
    .iter()
    .map(|d| WindowedHealthRecord {
      metadata: metadata.clone(),
      ts: image.ts,
      session_id: image.session_id.clone(),
      detection_score: d.item.score,
      detection_class: d.item.class_id,
      health_weight: d.health_weight,
      health_score: d.health_weight * d.item.score,
    })
    .collect()
}
