// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/output/jsonl.rs - JSON Lines 文件输出
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

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputRecord, Sink},
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

pub struct JsonLinesOutput {
  path: PathBuf,
  writer: BufWriter<File>,
  written: usize,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "file";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  /// `?append` 追加写入，否则覆盖
  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }
    let append = uri.query_pairs().any(|(k, _)| k == "append");
    Self::create(uri.path(), append)
  }
}

impl JsonLinesOutput {
  pub fn create(path: impl AsRef<Path>, append: bool) -> Result<Self, JsonLinesOutputError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() && !parent.exists() {
        std::fs::create_dir_all(parent)?;
      }
    }
    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .append(append)
      .truncate(!append)
      .open(&path)?;
    info!("输出文件: {}", path.display());
    Ok(Self {
      path,
      writer: BufWriter::new(file),
      written: 0,
    })
  }

  pub fn written(&self) -> usize {
    self.written
  }
}

impl Sink for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn write_record(&mut self, record: &OutputRecord) -> Result<(), Self::Error> {
    serde_json::to_writer(&mut self.writer, record)?;
    self.writer.write_all(b"\n")?;
    self.written += 1;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    self.writer.flush()?;
    debug!("已写入 {} 条记录到 {}", self.written, self.path.display());
    Ok(())
  }
}
