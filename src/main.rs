// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use healthtrend::{
  FromUrl,
  calibration::DirectoryCalibrationStore,
  detection::{AnnotatedImage, HealthWeightTable},
  input::open_input,
  output::OutputWrapper,
  pipeline::PipelineBuilder,
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  let args = args::Args::parse();

  tracing_subscriber::fmt()
    .with_max_level(args.log_level)
    .init();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!(
    "窗口: {}s / {}s, 置信度阈值: {}",
    args.health_window_size, args.health_window_period, args.min_score_threshold
  );

  let weights = match &args.weights {
    Some(path) => HealthWeightTable::from_json_file(path)?,
    None => HealthWeightTable::default(),
  };

  let mut builder = PipelineBuilder::new(args.engine_config())
    .weights(weights)
    .render_paths(args.render_paths());
  if let Some(url) = &args.calibration {
    info!("设备标定目录: {}", url);
    builder = builder.calibration(DirectoryCalibrationStore::from_url(url)?);
  }
  let mut pipeline = builder.build()?;

  let input = open_input::<AnnotatedImage>(&args.input)?;
  let mut output = OutputWrapper::from_url(&args.output)?;

  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
    })?;
  }

  let summary = ContinuousTask::default()
    .with_max_delay(args.max_delay)
    .with_event_number((args.max_events > 0).then_some(args.max_events))
    .with_stop_flag(stop)
    .run_task(input, &mut pipeline, &mut output)?;

  info!("处理完成!");
  info!("总事件数: {}", summary.events);
  info!("总触发数: {}", summary.panes);
  info!("健康趋势数: {}", summary.trends);
  info!("渲染消息数: {}", summary.renders);

  Ok(())
}
