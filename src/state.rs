// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/state.rs - 按会话键隔离的持久计数器
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
use std::sync::{Arc, Mutex, MutexGuard};

/// 按键存储的计数器，各键之间互不影响
pub trait KeyedState {
  fn get(&self, key: &str) -> u64;

  /// 原子地读取、加一并写回，返回 (加一之前, 加一之后)
  fn increment(&self, key: &str) -> (u64, u64);

  /// 键过期时回收状态
  fn clear(&self, key: &str);
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyedState {
  counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl InMemoryKeyedState {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
    self
      .counters
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}

impl KeyedState for InMemoryKeyedState {
  fn get(&self, key: &str) -> u64 {
    self.lock().get(key).copied().unwrap_or(0)
  }

  fn increment(&self, key: &str) -> (u64, u64) {
    let mut counters = self.lock();
    let counter = counters.entry(key.to_string()).or_insert(0);
    let before = *counter;
    *counter = before.saturating_add(1);
    (before, *counter)
  }

  fn clear(&self, key: &str) {
    self.lock().remove(key);
  }
}
