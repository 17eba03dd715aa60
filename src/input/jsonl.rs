// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/input/jsonl.rs - JSON Lines 文件输入
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

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum JsonLinesInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 每行一个 JSON 对象的文件
pub struct JsonLinesInput<T> {
  path: PathBuf,
  file: File,
  _phantom: PhantomData<T>,
}

impl<T> FromUrlWithScheme for JsonLinesInput<T> {
  const SCHEME: &'static str = "file";
}

impl<T> FromUrl for JsonLinesInput<T> {
  type Error = JsonLinesInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(JsonLinesInputError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

impl<T> JsonLinesInput<T> {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, JsonLinesInputError> {
    let path = path.into();
    let file = File::open(&path)?;
    Ok(Self {
      path,
      file,
      _phantom: PhantomData,
    })
  }
}

impl<T: DeserializeOwned> IntoIterator for JsonLinesInput<T> {
  type Item = T;
  type IntoIter = JsonLinesIter<T>;

  fn into_iter(self) -> Self::IntoIter {
    JsonLinesIter {
      path: self.path,
      lines: BufReader::new(self.file).lines(),
      line_number: 0,
      _phantom: PhantomData,
    }
  }
}

/// 逐行解析；空行跳过，格式错误的行记录日志后跳过
pub struct JsonLinesIter<T> {
  path: PathBuf,
  lines: Lines<BufReader<File>>,
  line_number: usize,
  _phantom: PhantomData<T>,
}

impl<T: DeserializeOwned> Iterator for JsonLinesIter<T> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let line = match self.lines.next()? {
        Ok(line) => line,
        Err(e) => {
          error!("读取 {} 失败: {}", self.path.display(), e);
          return None;
        }
      };
      self.line_number += 1;
      if line.trim().is_empty() {
        continue;
      }
      match serde_json::from_str(&line) {
        Ok(value) => return Some(value),
        Err(e) => {
          warn!(
            "跳过 {} 第 {} 行: {}",
            self.path.display(),
            self.line_number,
            e
          );
        }
      }
    }
  }
}
