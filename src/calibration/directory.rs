// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/calibration/directory.rs - 目录标定存储
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

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  calibration::{CalibrationError, CalibrationStore},
  detection::CalibrationRegion,
};

const DEFAULT_CALIBRATION_FILENAME: &str = "calibration.json";

#[derive(Deserialize)]
struct CalibrationFile {
  coordinates: [f32; 4],
}

/// 从 `{base}/{device_id}/calibration.json` 读取标定
///
/// URL 形如 `folder:///data/calibration?filename=aoi.json`。
#[derive(Debug, Clone)]
pub struct DirectoryCalibrationStore {
  directory: PathBuf,
  filename: String,
}

impl FromUrlWithScheme for DirectoryCalibrationStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryCalibrationStore {
  type Error = CalibrationError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(CalibrationError::SchemeMismatch);
    }

    let filename = uri
      .query_pairs()
      .find(|(k, _)| k == "filename")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_CALIBRATION_FILENAME.to_string());

    Ok(Self::new(uri.path()).with_filename(filename))
  }
}

impl DirectoryCalibrationStore {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      filename: DEFAULT_CALIBRATION_FILENAME.to_string(),
    }
  }

  pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
    self.filename = filename.into();
    self
  }

  fn device_path(&self, device_id: u64) -> PathBuf {
    self
      .directory
      .join(device_id.to_string())
      .join(&self.filename)
  }
}

impl CalibrationStore for DirectoryCalibrationStore {
  fn load(&self, device_id: u64) -> Result<Option<CalibrationRegion>, CalibrationError> {
    let path = self.device_path(device_id);
    if !path.exists() {
      debug!("设备 {} 没有标定文件: {}", device_id, path.display());
      return Ok(None);
    }

    let text = std::fs::read_to_string(&path)
      .map_err(|source| CalibrationError::Io { device_id, source })?;
    let file: CalibrationFile = serde_json::from_str(&text)
      .map_err(|source| CalibrationError::Malformed { device_id, source })?;
    let region = CalibrationRegion::new(file.coordinates);
    region
      .validate()
      .map_err(|reason| CalibrationError::InvalidRegion { device_id, reason })?;

    info!("已加载设备标定: {}", path.display());
    Ok(Some(region))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write(dir: &std::path::Path, device_id: u64, body: &str) {
    let device_dir = dir.join(device_id.to_string());
    std::fs::create_dir_all(&device_dir).unwrap();
    std::fs::write(device_dir.join(DEFAULT_CALIBRATION_FILENAME), body).unwrap();
  }

  #[test]
  fn loads_region_and_ignores_extra_fields() {
    let dir = tempfile::tempdir().unwrap();
    write(
      dir.path(),
      7,
      r#"{"coordinates": [0.1, 0.2, 0.8, 0.9], "mask": [], "fpm": 30}"#,
    );
    let store = DirectoryCalibrationStore::new(dir.path());
    let region = store.load(7).unwrap().unwrap();
    assert_eq!(region.coordinates, [0.1, 0.2, 0.8, 0.9]);
  }

  #[test]
  fn missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryCalibrationStore::new(dir.path());
    assert!(store.load(1).unwrap().is_none());
  }

  #[test]
  fn malformed_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 3, "{ not json");
    let store = DirectoryCalibrationStore::new(dir.path());
    assert!(matches!(
      store.load(3),
      Err(CalibrationError::Malformed { device_id: 3, .. })
    ));
  }

  #[test]
  fn inverted_region_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), 4, r#"{"coordinates": [0.9, 0.2, 0.1, 0.9]}"#);
    let store = DirectoryCalibrationStore::new(dir.path());
    assert!(matches!(
      store.load(4),
      Err(CalibrationError::InvalidRegion { device_id: 4, .. })
    ));
  }

  #[test]
  fn from_url_with_filename() {
    let url = url::Url::parse("folder:///data/calib?filename=aoi.json").unwrap();
    let store = DirectoryCalibrationStore::from_url(&url).unwrap();
    assert_eq!(store.device_path(5), PathBuf::from("/data/calib/5/aoi.json"));

    let wrong = url::Url::parse("file:///data/calib").unwrap();
    assert!(matches!(
      DirectoryCalibrationStore::from_url(&wrong),
      Err(CalibrationError::SchemeMismatch)
    ));
  }
}
