// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/monitor.rs - 有状态会话监视
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

use tracing::{info, warn};

use crate::{
  state::KeyedState,
  trend::HealthTrend,
  window::{PaneInfo, Window},
};

/// 交给策略函数判断的上下文
#[derive(Debug, Clone, Copy)]
pub struct MonitorContext<'a> {
  pub key: &'a str,
  pub window: Window,
  pub pane: &'a PaneInfo,
  /// 该会话的全部窗口都在本次水位推进中关闭，且这是其中最后一次触发
  pub session_closing: bool,
  /// 本次触发之前的计数
  pub failures_before: u64,
  /// 本次触发之后的计数
  pub failures: u64,
  pub trends: &'a [HealthTrend],
}

/// 告警与会话完成的判定由调用方提供
pub trait MonitorPolicy {
  fn should_alert(&self, ctx: &MonitorContext<'_>) -> bool;
  fn is_session_complete(&self, ctx: &MonitorContext<'_>) -> bool;
}

/// 从不告警，会话最后一个窗口关闭时视为完成
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalPanePolicy;

impl MonitorPolicy for FinalPanePolicy {
  fn should_alert(&self, _ctx: &MonitorContext<'_>) -> bool {
    false
  }

  fn is_session_complete(&self, ctx: &MonitorContext<'_>) -> bool {
    ctx.session_closing
  }
}

/// 用两个闭包组成的策略
pub struct FnPolicy<A, C> {
  alert: A,
  complete: C,
}

impl<A, C> FnPolicy<A, C>
where
  A: Fn(&MonitorContext<'_>) -> bool,
  C: Fn(&MonitorContext<'_>) -> bool,
{
  pub fn new(alert: A, complete: C) -> Self {
    Self { alert, complete }
  }
}

impl<A, C> MonitorPolicy for FnPolicy<A, C>
where
  A: Fn(&MonitorContext<'_>) -> bool,
  C: Fn(&MonitorContext<'_>) -> bool,
{
  fn should_alert(&self, ctx: &MonitorContext<'_>) -> bool {
    (self.alert)(ctx)
  }

  fn is_session_complete(&self, ctx: &MonitorContext<'_>) -> bool {
    (self.complete)(ctx)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorOutput {
  pub key: String,
  pub window: Window,
  pub pane: PaneInfo,
  pub failures_before: u64,
  pub failures: u64,
  /// 原样透传的趋势
  pub trends: Vec<HealthTrend>,
  pub alert: bool,
  pub is_final: bool,
}

pub struct SessionMonitor<S, P = FinalPanePolicy> {
  state: S,
  policy: P,
}

impl<S: KeyedState> SessionMonitor<S, FinalPanePolicy> {
  pub fn new(state: S) -> Self {
    Self {
      state,
      policy: FinalPanePolicy,
    }
  }
}

impl<S: KeyedState, P: MonitorPolicy> SessionMonitor<S, P> {
  pub fn with_policy<Q: MonitorPolicy>(self, policy: Q) -> SessionMonitor<S, Q> {
    SessionMonitor {
      state: self.state,
      policy,
    }
  }

  pub fn state(&self) -> &S {
    &self.state
  }

  /// 每次窗口触发调用一次：计数加一，趋势原样透传
  pub fn on_pane(
    &self,
    key: &str,
    window: Window,
    pane: PaneInfo,
    session_closing: bool,
    trends: Vec<HealthTrend>,
  ) -> MonitorOutput {
    let (failures_before, failures) = self.state.increment(key);

    info!(
      "会话 {} 窗口 {} 触发 pane={} is_last={} 趋势数={} failures={}",
      key,
      window,
      pane.index,
      pane.is_last,
      trends.len(),
      failures_before
    );

    let ctx = MonitorContext {
      key,
      window,
      pane: &pane,
      session_closing,
      failures_before,
      failures,
      trends: &trends,
    };
    let alert = self.policy.should_alert(&ctx);
    let is_final = self.policy.is_session_complete(&ctx);

    if alert {
      warn!("会话 {} 检测到异常 failures={}", key, failures);
    }
    if is_final {
      info!("会话 {} 在窗口 {} 完成", key, window);
    }

    MonitorOutput {
      key: key.to_string(),
      window,
      pane,
      failures_before,
      failures,
      trends,
      alert,
      is_final,
    }
  }

  /// 键过期时回收计数
  pub fn expire(&self, key: &str) {
    self.state.clear(key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::InMemoryKeyedState;
  use crate::window::PaneTiming;

  const WINDOW: Window = Window { start: 0, end: 30 };

  fn early(index: u64) -> PaneInfo {
    PaneInfo::new(index, false, PaneTiming::Early)
  }

  #[test]
  fn counter_increments_per_pane() {
    let monitor = SessionMonitor::new(InMemoryKeyedState::new());
    let a = monitor.on_pane("s", WINDOW, early(0), false, Vec::new());
    let b = monitor.on_pane("s", WINDOW, early(1), false, Vec::new());
    assert_eq!((a.failures_before, a.failures), (0, 1));
    assert_eq!((b.failures_before, b.failures), (1, 2));
    assert!(!b.is_final);
    assert!(!b.alert);
  }

  #[test]
  fn counters_are_independent_across_keys() {
    let monitor = SessionMonitor::new(InMemoryKeyedState::new());
    monitor.on_pane("a", WINDOW, early(0), false, Vec::new());
    monitor.on_pane("a", WINDOW, early(1), false, Vec::new());
    let b = monitor.on_pane("b", WINDOW, early(0), false, Vec::new());
    assert_eq!(b.failures, 1);
    assert_eq!(monitor.state().get("a"), 2);
  }

  #[test]
  fn complete_only_when_session_closes() {
    let monitor = SessionMonitor::new(InMemoryKeyedState::new());
    let last = PaneInfo::new(2, true, PaneTiming::OnTime);
    // 窗口的最后一次触发不等于会话结束
    let window_closed = monitor.on_pane("s", WINDOW, last, false, Vec::new());
    assert!(!window_closed.is_final);
    let session_closed = monitor.on_pane("s", WINDOW, last, true, Vec::new());
    assert!(session_closed.is_final);
  }

  #[test]
  fn caller_policy_decides() {
    let monitor = SessionMonitor::new(InMemoryKeyedState::new()).with_policy(FnPolicy::new(
      |ctx: &MonitorContext<'_>| ctx.failures >= 2,
      |ctx: &MonitorContext<'_>| ctx.pane.index >= 1,
    ));
    let first = monitor.on_pane("s", WINDOW, early(0), false, Vec::new());
    let second = monitor.on_pane("s", WINDOW, early(1), false, Vec::new());
    assert!(!first.alert && !first.is_final);
    assert!(second.alert && second.is_final);
  }

  #[test]
  fn expire_resets_counter() {
    let monitor = SessionMonitor::new(InMemoryKeyedState::new());
    monitor.on_pane("s", WINDOW, early(0), false, Vec::new());
    monitor.expire("s");
    assert_eq!(monitor.state().get("s"), 0);
  }
}
