// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/task.rs - 事件流处理任务
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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::{
  detection::AnnotatedImage,
  monitor::MonitorPolicy,
  output::Sink,
  pipeline::{PaneResult, WindowedPipeline},
  state::KeyedState,
};

pub trait Task<I, O>: Sized {
  type Error;
  fn run_task<S, P>(
    self,
    input: I,
    pipeline: &mut WindowedPipeline<S, P>,
    output: &mut O,
  ) -> Result<TaskSummary, Self::Error>
  where
    S: KeyedState,
    P: MonitorPolicy;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
  pub events: usize,
  pub panes: usize,
  pub trends: usize,
  pub renders: usize,
}

impl TaskSummary {
  fn count(&mut self, results: &[PaneResult]) {
    self.panes += results.len();
    for r in results {
      self.trends += r.monitor.trends.len();
      self.renders += usize::from(r.render.is_some());
    }
  }
}

/// 按事件时间推进水位线：水位线 = 已见最大时间戳 - 最大乱序延迟
#[derive(Debug, Default)]
pub struct ContinuousTask {
  max_delay_secs: f64,
  event_number: Option<usize>,
  stop: Option<Arc<AtomicBool>>,
}

impl ContinuousTask {
  pub fn with_max_delay(mut self, secs: f64) -> Self {
    self.max_delay_secs = secs.max(0.0);
    self
  }

  pub fn with_event_number(mut self, event_number: Option<usize>) -> Self {
    self.event_number = event_number;
    self
  }

  /// 外部置位后在下一个事件前退出循环
  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }
}

fn write_results<O>(output: &mut O, results: &[PaneResult]) -> Result<(), O::Error>
where
  O: Sink,
{
  for r in results {
    for record in r.output_records() {
      output.write_record(&record)?;
    }
  }
  Ok(())
}

impl<I, O> Task<I, O> for ContinuousTask
where
  I: Iterator<Item = AnnotatedImage>,
  O: Sink,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task<S, P>(
    self,
    input: I,
    pipeline: &mut WindowedPipeline<S, P>,
    output: &mut O,
  ) -> Result<TaskSummary, Self::Error>
  where
    S: KeyedState,
    P: MonitorPolicy,
  {
    info!("开始任务...");
    let mut summary = TaskSummary::default();
    let mut max_ts = f64::NEG_INFINITY;

    for event in input {
      if self
        .stop
        .as_ref()
        .is_some_and(|stop| stop.load(Ordering::SeqCst))
      {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      let ts = event.metadata.ts;
      pipeline.push(event);
      summary.events += 1;

      if ts.is_finite() && ts > max_ts {
        max_ts = ts;
        let results = pipeline.advance_watermark(max_ts - self.max_delay_secs);
        summary.count(&results);
        write_results(output, &results)?;
      }

      if self.event_number.is_some_and(|n| summary.events >= n) {
        info!("达到指定事件数 {}, 退出任务循环", summary.events);
        break;
      }
    }

    let results = pipeline.flush();
    summary.count(&results);
    write_results(output, &results)?;
    output.finish()?;

    info!(
      "任务完成: 事件 {}, 触发 {}, 趋势 {}, 渲染消息 {}",
      summary.events, summary.panes, summary.trends, summary.renders
    );
    Ok(summary)
  }
}
