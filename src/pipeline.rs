// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/pipeline.rs - 按会话分组的窗口化处理流水线
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

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
  calibration::{CalibrationStore, NoCalibration},
  config::EngineConfig,
  detection::{AnnotatedImage, CalibrationRegion, HealthWeightTable},
  filter::DetectionFilter,
  monitor::{FinalPanePolicy, MonitorOutput, MonitorPolicy, SessionMonitor},
  output::OutputRecord,
  record::{WindowedHealthRecord, explode},
  render::{RenderPaths, RenderTriggerBuilder, RenderTriggerMessage},
  state::{InMemoryKeyedState, KeyedState},
  trend::TrendAggregator,
  window::{
    AfterWatermark, EarlyAndFinal, PaneInfo, PaneTiming, SlidingWindows, Trigger, Window,
    WindowAssigner, WindowError, WindowState,
  },
};

/// 一次窗口触发的全部产出
#[derive(Debug, Clone, PartialEq)]
pub struct PaneResult {
  pub key: String,
  pub window: Window,
  pub records: Vec<WindowedHealthRecord>,
  pub monitor: MonitorOutput,
  pub render: Option<RenderTriggerMessage>,
}

impl PaneResult {
  pub fn pane(&self) -> &PaneInfo {
    &self.monitor.pane
  }

  /// 转为待写出的记录
  pub fn output_records(&self) -> Vec<OutputRecord> {
    let mut out: Vec<OutputRecord> = self
      .monitor
      .trends
      .iter()
      .cloned()
      .map(OutputRecord::Trend)
      .collect();
    if let Some(render) = &self.render {
      out.push(OutputRecord::Render(render.clone()));
    }
    out
  }
}

#[derive(Debug, Default)]
struct WindowBuffer {
  events: Vec<AnnotatedImage>,
  pending: usize,
  panes_fired: u64,
}

#[derive(Debug, Clone)]
enum CachedCalibration {
  Missing,
  Region(CalibrationRegion),
  Invalid,
}

pub struct PipelineBuilder<S = InMemoryKeyedState, P = FinalPanePolicy> {
  config: EngineConfig,
  weights: HealthWeightTable,
  calibration: Box<dyn CalibrationStore>,
  assigner: Option<Box<dyn WindowAssigner>>,
  trigger: Option<Box<dyn Trigger>>,
  render_paths: RenderPaths,
  monitor: SessionMonitor<S, P>,
  clock: fn() -> DateTime<Utc>,
}

impl PipelineBuilder {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      config,
      weights: HealthWeightTable::default(),
      calibration: Box::new(NoCalibration),
      assigner: None,
      trigger: None,
      render_paths: RenderPaths::default(),
      monitor: SessionMonitor::new(InMemoryKeyedState::new()),
      clock: Utc::now,
    }
  }
}

impl<S: KeyedState, P: MonitorPolicy> PipelineBuilder<S, P> {
  pub fn weights(mut self, weights: HealthWeightTable) -> Self {
    self.weights = weights;
    self
  }

  pub fn calibration(mut self, store: impl CalibrationStore + 'static) -> Self {
    self.calibration = Box::new(store);
    self
  }

  /// 默认使用配置中的滑动窗口
  pub fn assigner(mut self, assigner: impl WindowAssigner + 'static) -> Self {
    self.assigner = Some(Box::new(assigner));
    self
  }

  /// 默认按配置选择 `EarlyAndFinal` 或 `AfterWatermark`
  pub fn trigger(mut self, trigger: impl Trigger + 'static) -> Self {
    self.trigger = Some(Box::new(trigger));
    self
  }

  pub fn render_paths(mut self, paths: RenderPaths) -> Self {
    self.render_paths = paths;
    self
  }

  pub fn clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
    self.clock = clock;
    self
  }

  pub fn monitor<S2: KeyedState, P2: MonitorPolicy>(
    self,
    monitor: SessionMonitor<S2, P2>,
  ) -> PipelineBuilder<S2, P2> {
    PipelineBuilder {
      config: self.config,
      weights: self.weights,
      calibration: self.calibration,
      assigner: self.assigner,
      trigger: self.trigger,
      render_paths: self.render_paths,
      monitor,
      clock: self.clock,
    }
  }

  pub fn build(self) -> Result<WindowedPipeline<S, P>, WindowError> {
    let assigner = match self.assigner {
      Some(assigner) => assigner,
      None => Box::new(SlidingWindows::new(
        self.config.window_size_secs,
        self.config.window_period_secs,
      )?),
    };
    let trigger: Box<dyn Trigger> = match self.trigger {
      Some(trigger) => trigger,
      None if self.config.early_firing => Box::new(EarlyAndFinal),
      None => Box::new(AfterWatermark),
    };
    let filter = DetectionFilter::new(self.weights)
      .with_score_threshold(self.config.score_threshold)
      .with_min_overlap(self.config.min_calibration_overlap);

    info!(
      "创建流水线: 窗口 {}s/{}s, 阈值 {}, 预热 {}, 拟合阶数 {}",
      self.config.window_size_secs,
      self.config.window_period_secs,
      self.config.score_threshold,
      self.config.warmup,
      self.config.polyfit_degree
    );

    Ok(WindowedPipeline {
      assigner,
      trigger,
      calibration: self.calibration,
      calibration_cache: HashMap::new(),
      filter,
      aggregator: TrendAggregator::new(self.config.warmup, self.config.polyfit_degree),
      monitor: self.monitor,
      render: RenderTriggerBuilder::new(self.render_paths),
      allowed_lateness: self.config.allowed_lateness_secs.max(0),
      buffers: BTreeMap::new(),
      watermark: f64::NEG_INFINITY,
      clock: self.clock,
    })
  }
}

/// 内存中的窗口化执行器
///
/// 每个 (会话, 窗口) 独立累积事件；每次触发都基于完整的累积集合重新计算。
pub struct WindowedPipeline<S = InMemoryKeyedState, P = FinalPanePolicy> {
  assigner: Box<dyn WindowAssigner>,
  trigger: Box<dyn Trigger>,
  calibration: Box<dyn CalibrationStore>,
  calibration_cache: HashMap<u64, CachedCalibration>,
  filter: DetectionFilter,
  aggregator: TrendAggregator,
  monitor: SessionMonitor<S, P>,
  render: RenderTriggerBuilder,
  allowed_lateness: i64,
  buffers: BTreeMap<(String, Window), WindowBuffer>,
  watermark: f64,
  clock: fn() -> DateTime<Utc>,
}

impl<S: KeyedState, P: MonitorPolicy> WindowedPipeline<S, P> {
  pub fn watermark(&self) -> f64 {
    self.watermark
  }

  pub fn monitor(&self) -> &SessionMonitor<S, P> {
    &self.monitor
  }

  /// 当前仍存活的窗口数
  pub fn live_windows(&self) -> usize {
    self.buffers.len()
  }

  fn expiry(&self, window: &Window) -> f64 {
    window.end.saturating_add(self.allowed_lateness) as f64
  }

  /// 接收一个事件，分配到所有包含其时间戳的窗口
  pub fn push(&mut self, event: AnnotatedImage) {
    let ts = event.metadata.ts;
    let windows = self.assigner.assign(ts);
    if windows.is_empty() {
      debug!("事件时间戳无效，丢弃: {}", ts);
      return;
    }

    for window in windows {
      if self.expiry(&window) <= self.watermark {
        debug!(
          "会话 {} 窗口 {} 已过期，丢弃迟到事件 ts={}",
          event.metadata.session_id, window, ts
        );
        continue;
      }
      let buffer = self
        .buffers
        .entry((event.metadata.session_id.clone(), window))
        .or_default();
      buffer.events.push(event.clone());
      buffer.pending += 1;
    }
  }

  /// 推进水位线，触发满足条件的窗口，并回收已关闭的窗口
  pub fn advance_watermark(&mut self, watermark: f64) -> Vec<PaneResult> {
    if watermark > self.watermark {
      self.watermark = watermark;
    }

    let mut firing = Vec::new();
    let mut closed = Vec::new();
    // 仍有未关闭窗口的会话
    let mut open_keys = BTreeSet::new();

    for ((key, window), buffer) in &self.buffers {
      let closing = self.expiry(window) <= self.watermark;
      let state = WindowState {
        window: *window,
        element_count: buffer.events.len(),
        pending_count: buffer.pending,
        panes_fired: buffer.panes_fired,
        watermark: self.watermark,
        closing,
      };
      if self.trigger.should_fire(&state) {
        firing.push((key.clone(), *window, closing));
      }
      if closing {
        closed.push((key.clone(), *window));
      } else {
        open_keys.insert(key.clone());
      }
    }

    // 会话的全部窗口都关闭时，只有其最后一次触发标记为会话结束
    let mut session_closing = vec![false; firing.len()];
    let mut marked = BTreeSet::new();
    for (i, (key, _, _)) in firing.iter().enumerate().rev() {
      if !open_keys.contains(key) && marked.insert(key.clone()) {
        session_closing[i] = true;
      }
    }

    let mut results = Vec::with_capacity(firing.len());
    for ((key, window, closing), session_closing) in firing.into_iter().zip(session_closing) {
      results.push(self.fire(&key, window, closing, session_closing));
    }

    let mut touched = BTreeSet::new();
    for entry in closed {
      self.buffers.remove(&entry);
      touched.insert(entry.0);
    }
    for key in touched {
      let alive = self
        .buffers
        .range((key.clone(), Window { start: i64::MIN, end: i64::MIN })..)
        .next()
        .is_some_and(|((k, _), _)| *k == key);
      if !alive {
        debug!("会话 {} 已无存活窗口，回收状态", key);
        self.monitor.expire(&key);
      }
    }

    results
  }

  /// 输入结束时关闭全部窗口
  pub fn flush(&mut self) -> Vec<PaneResult> {
    self.advance_watermark(f64::INFINITY)
  }

  fn calibration_for(&mut self, device_id: u64) -> CachedCalibration {
    if let Some(cached) = self.calibration_cache.get(&device_id) {
      return cached.clone();
    }
    let loaded = match self.calibration.load(device_id) {
      Ok(Some(region)) => CachedCalibration::Region(region),
      Ok(None) => CachedCalibration::Missing,
      Err(e) => {
        error!("设备 {} 标定错误，丢弃该设备的事件: {}", device_id, e);
        CachedCalibration::Invalid
      }
    };
    self.calibration_cache.insert(device_id, loaded.clone());
    loaded
  }

  fn fire(
    &mut self,
    key: &str,
    window: Window,
    closing: bool,
    session_closing: bool,
  ) -> PaneResult {
    let entry = (key.to_string(), window);
    let (events, index) = match self.buffers.get_mut(&entry) {
      Some(buffer) => {
        let index = buffer.panes_fired;
        buffer.panes_fired += 1;
        buffer.pending = 0;
        (buffer.events.clone(), index)
      }
      None => (Vec::new(), 0),
    };

    let timing = if self.watermark < window.end as f64 {
      PaneTiming::Early
    } else if closing {
      PaneTiming::OnTime
    } else {
      PaneTiming::Late
    };
    let pane = PaneInfo::new(index, closing, timing);

    let mut records = Vec::new();
    for event in &events {
      let calibration = match self.calibration_for(event.metadata.device_id) {
        CachedCalibration::Region(region) => Some(region),
        CachedCalibration::Missing => None,
        CachedCalibration::Invalid => continue,
      };
      let kept = self.filter.filter(&event.detections, calibration.as_ref());
      records.extend(explode(&kept, &event.metadata, window));
    }

    let trends: Vec<_> = self
      .aggregator
      .aggregate(key, window, &records)
      .into_iter()
      .collect();
    let monitor = self
      .monitor
      .on_pane(key, window, pane, session_closing, trends);

    let render = if monitor.is_final {
      let render = self
        .render
        .build_from_records(key, &records, true, (self.clock)());
      if render.is_none() {
        warn!("会话 {} 已完成但窗口 {} 没有有效记录，不发送渲染消息", key, window);
      }
      render
    } else {
      None
    };

    PaneResult {
      key: key.to_string(),
      window,
      records,
      monitor,
      render,
    }
  }
}
