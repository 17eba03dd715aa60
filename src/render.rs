// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/render.rs - 视频渲染触发消息
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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::record::{SessionMetadata, WindowedHealthRecord};

const VIDEO_FILE_NAME: &str = "annotated_video.mp4";

pub const DEFAULT_IN_BASE: &str = "dataflow/telemetry_event/annotated_images";
pub const DEFAULT_OUT_BASE: &str = "dataflow/telemetry_event/annotated_video";
pub const DEFAULT_CDN_BASE: &str = "https://cdn.healthtrend.dev";
pub const DEFAULT_CDN_UPLOAD: &str = "uploads/annotated_video";
pub const DEFAULT_BUCKET: &str = "healthtrend-sandbox";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventType {
  VideoDone,
  Failure,
}

/// 渲染服务读取与写入的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPaths {
  pub in_base: String,
  pub out_base: String,
  pub cdn_base: String,
  pub cdn_upload: String,
  pub bucket: String,
}

impl Default for RenderPaths {
  fn default() -> Self {
    Self {
      in_base: DEFAULT_IN_BASE.to_string(),
      out_base: DEFAULT_OUT_BASE.to_string(),
      cdn_base: DEFAULT_CDN_BASE.to_string(),
      cdn_upload: DEFAULT_CDN_UPLOAD.to_string(),
      bucket: DEFAULT_BUCKET.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTriggerMessage {
  pub session_id: String,
  pub metadata: SessionMetadata,
  pub event_type: AlertEventType,
  pub source_path: String,
  pub destination_path: String,
  pub cdn_output: String,
  pub cdn_relative: String,
  pub bucket: String,
}

impl RenderTriggerMessage {
  pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(self)
  }
}

/// 按 `/` 拼接路径片段，忽略片段首尾多余的分隔符
fn join_path<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
  let mut out = String::new();
  for part in parts {
    let trimmed = if out.is_empty() {
      part.trim_end_matches('/')
    } else {
      part.trim_matches('/')
    };
    if trimmed.is_empty() {
      continue;
    }
    if !out.is_empty() {
      out.push('/');
    }
    out.push_str(trimmed);
  }
  out
}

#[derive(Debug, Clone, Default)]
pub struct RenderTriggerBuilder {
  paths: RenderPaths,
}

impl RenderTriggerBuilder {
  pub fn new(paths: RenderPaths) -> Self {
    Self { paths }
  }

  pub fn paths(&self) -> &RenderPaths {
    &self.paths
  }

  /// 会话结束时构造一条渲染消息，非最终触发不输出
  pub fn build(
    &self,
    key: &str,
    metadata: &SessionMetadata,
    is_final: bool,
    now: DateTime<Utc>,
  ) -> Option<RenderTriggerMessage> {
    if !is_final {
      debug!("会话 {} 非最终触发，不发送渲染消息", key);
      return None;
    }

    let datestamp = now.format("%Y/%m/%d").to_string();
    let suffix = join_path([key, datestamp.as_str(), VIDEO_FILE_NAME]);
    let cdn_relative = join_path([self.paths.cdn_upload.as_str(), suffix.as_str()]);

    let msg = RenderTriggerMessage {
      session_id: key.to_string(),
      metadata: metadata.without_window(),
      event_type: AlertEventType::VideoDone,
      source_path: join_path([self.paths.in_base.as_str(), key]),
      destination_path: join_path([self.paths.out_base.as_str(), suffix.as_str()]),
      cdn_output: join_path([self.paths.cdn_base.as_str(), cdn_relative.as_str()]),
      cdn_relative,
      bucket: self.paths.bucket.clone(),
    };
    info!(
      "会话 {} 发送渲染消息: {} -> {}",
      key, msg.source_path, msg.destination_path
    );
    Some(msg)
  }

  /// 使用第一条记录的元数据构造
  pub fn build_from_records(
    &self,
    key: &str,
    records: &[WindowedHealthRecord],
    is_final: bool,
    now: DateTime<Utc>,
  ) -> Option<RenderTriggerMessage> {
    let first = records.first()?;
    self.build(key, &first.metadata, is_final, now)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn metadata() -> SessionMetadata {
    SessionMetadata {
      session_id: "session-1".to_string(),
      user_id: 3,
      device_id: 9,
      cloud_device_id: Some(900),
      client_version: "1.2.3".to_string(),
      window_start: Some(0),
      window_end: Some(300),
    }
  }

  fn paths() -> RenderPaths {
    RenderPaths {
      in_base: "gs://bucket/in/".to_string(),
      out_base: "gs://bucket/out".to_string(),
      cdn_base: "https://cdn.example.com/".to_string(),
      cdn_upload: "uploads".to_string(),
      bucket: "bucket".to_string(),
    }
  }

  #[test]
  fn final_pane_builds_paths() {
    let now = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
    let msg = RenderTriggerBuilder::new(paths())
      .build("session-1", &metadata(), true, now)
      .unwrap();
    assert_eq!(msg.source_path, "gs://bucket/in/session-1");
    assert_eq!(
      msg.destination_path,
      "gs://bucket/out/session-1/2026/03/07/annotated_video.mp4"
    );
    assert_eq!(msg.cdn_relative, "uploads/session-1/2026/03/07/annotated_video.mp4");
    assert_eq!(
      msg.cdn_output,
      "https://cdn.example.com/uploads/session-1/2026/03/07/annotated_video.mp4"
    );
    assert_eq!(msg.bucket, "bucket");
    assert_eq!(msg.event_type, AlertEventType::VideoDone);
    assert_eq!(msg.metadata.device_id, 9);
    assert_eq!(msg.metadata.window_start, None);
  }

  #[test]
  fn default_paths() {
    let paths = RenderPaths::default();
    assert_eq!(paths.bucket, "healthtrend-sandbox");
    assert_eq!(paths.in_base, "dataflow/telemetry_event/annotated_images");
    assert_eq!(paths.out_base, "dataflow/telemetry_event/annotated_video");
    assert_eq!(paths.cdn_base, "https://cdn.healthtrend.dev");
    assert_eq!(paths.cdn_upload, "uploads/annotated_video");
  }

  #[test]
  fn non_final_pane_emits_nothing() {
    let builder = RenderTriggerBuilder::new(paths());
    assert!(builder.build("session-1", &metadata(), false, Utc::now()).is_none());
  }

  #[test]
  fn empty_records_emit_nothing() {
    let builder = RenderTriggerBuilder::default();
    assert!(builder.build_from_records("s", &[], true, Utc::now()).is_none());
  }

  #[test]
  fn message_serializes() {
    let msg = RenderTriggerBuilder::default()
      .build("s", &metadata(), true, Utc::now())
      .unwrap();
    let bytes = msg.to_json_bytes().unwrap();
    let back: RenderTriggerMessage = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(back, msg);
    assert!(String::from_utf8(bytes).unwrap().contains("\"video_done\""));
  }

  #[test]
  fn join_skips_empty_parts() {
    assert_eq!(join_path(["a/", "", "/b/", "c"]), "a/b/c");
    assert_eq!(join_path(["/root", "x"]), "/root/x");
  }
}
