// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/output.rs - 结果输出
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
use thiserror::Error;

use crate::FromUrl;
#[cfg(feature = "jsonl_output")]
use crate::FromUrlWithScheme;
use crate::{render::RenderTriggerMessage, trend::HealthTrend};

#[cfg(feature = "jsonl_output")]
mod jsonl;
#[cfg(feature = "jsonl_output")]
pub use self::jsonl::{JsonLinesOutput, JsonLinesOutputError};

/// 写出到外部存储或下游主题的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputRecord {
  Trend(HealthTrend),
  Render(RenderTriggerMessage),
}

pub trait Sink {
  type Error;
  fn write_record(&mut self, record: &OutputRecord) -> Result<(), Self::Error>;
  fn finish(&mut self) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "jsonl_output")]
  #[error("JSON Lines 输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 收集到内存，测试时使用
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
  pub records: Vec<OutputRecord>,
}

impl Sink for MemorySink {
  type Error = std::convert::Infallible;

  fn write_record(&mut self, record: &OutputRecord) -> Result<(), Self::Error> {
    self.records.push(record.clone());
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

pub enum OutputWrapper {
  #[cfg(feature = "jsonl_output")]
  JsonLinesOutput(JsonLinesOutput),
  Memory(MemorySink),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "jsonl_output")]
      JsonLinesOutput::SCHEME => {
        let output = JsonLinesOutput::from_url(url)?;
        Ok(OutputWrapper::JsonLinesOutput(output))
      }
      "memory" => Ok(OutputWrapper::Memory(MemorySink::default())),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Sink for OutputWrapper {
  type Error = OutputError;

  fn write_record(&mut self, record: &OutputRecord) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::JsonLinesOutput(output) => {
        output.write_record(record).map_err(OutputError::from)
      }
      OutputWrapper::Memory(sink) => {
        sink.records.push(record.clone());
        Ok(())
      }
    }
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::JsonLinesOutput(output) => output.finish().map_err(OutputError::from),
      OutputWrapper::Memory(_) => Ok(()),
    }
  }
}
