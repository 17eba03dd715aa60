// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/calibration.rs - 设备标定存储
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

use thiserror::Error;

use crate::detection::CalibrationRegion;

#[cfg(feature = "directory_calibration")]
mod directory;
#[cfg(feature = "directory_calibration")]
pub use self::directory::DirectoryCalibrationStore;

#[derive(Error, Debug)]
pub enum CalibrationError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("读取设备 {device_id} 的标定文件失败: {source}")]
  Io {
    device_id: u64,
    #[source]
    source: std::io::Error,
  },
  #[error("设备 {device_id} 的标定文件格式错误: {source}")]
  Malformed {
    device_id: u64,
    #[source]
    source: serde_json::Error,
  },
  #[error("设备 {device_id} 的标定区域无效: {reason}")]
  InvalidRegion { device_id: u64, reason: String },
}

/// 按设备查询关注区域；`Ok(None)` 表示该设备没有标定
pub trait CalibrationStore {
  fn load(&self, device_id: u64) -> Result<Option<CalibrationRegion>, CalibrationError>;
}

impl<T: CalibrationStore + ?Sized> CalibrationStore for Box<T> {
  fn load(&self, device_id: u64) -> Result<Option<CalibrationRegion>, CalibrationError> {
    (**self).load(device_id)
  }
}

/// 没有任何标定
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCalibration;

impl CalibrationStore for NoCalibration {
  fn load(&self, _device_id: u64) -> Result<Option<CalibrationRegion>, CalibrationError> {
    Ok(None)
  }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCalibrationStore {
  regions: HashMap<u64, CalibrationRegion>,
}

impl InMemoryCalibrationStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_region(mut self, device_id: u64, region: CalibrationRegion) -> Self {
    self.regions.insert(device_id, region);
    self
  }
}

impl CalibrationStore for InMemoryCalibrationStore {
  fn load(&self, device_id: u64) -> Result<Option<CalibrationRegion>, CalibrationError> {
    match self.regions.get(&device_id) {
      Some(region) => {
        region
          .validate()
          .map_err(|reason| CalibrationError::InvalidRegion { device_id, reason })?;
        Ok(Some(*region))
      }
      None => Ok(None),
    }
  }
}
