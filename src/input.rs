// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/input.rs - 事件输入
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

use thiserror::Error;

#[cfg(feature = "jsonl_input")]
mod jsonl;
#[cfg(feature = "jsonl_input")]
pub use self::jsonl::{JsonLinesInput, JsonLinesInputError, JsonLinesIter};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "jsonl_input")]
  #[error("JSON Lines 输入错误: {0}")]
  JsonLinesInputError(#[from] JsonLinesInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 根据 URL 方案选择输入源
pub fn open_input<T>(url: &url::Url) -> Result<Box<dyn Iterator<Item = T>>, InputError>
where
  T: serde::de::DeserializeOwned + 'static,
{
  #[cfg(feature = "jsonl_input")]
  {
    use crate::{FromUrl, FromUrlWithScheme};

    if url.scheme() == JsonLinesInput::<T>::SCHEME {
      let input = JsonLinesInput::<T>::from_url(url)?;
      return Ok(Box::new(input.into_iter()));
    }
  }
  let _ = url;
  Err(InputError::SchemeMismatch)
}
