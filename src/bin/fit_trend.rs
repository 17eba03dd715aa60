// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/bin/fit_trend.rs - 离线拟合窗口记录的健康趋势
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

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use healthtrend::{
  input::open_input,
  record::WindowedHealthRecord,
  trend::TrendAggregator,
  window::Window,
};

/// 读取窗口化健康记录，按 (会话, 窗口) 分组拟合趋势并以 JSON 行输出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// 记录来源，例如 file:///data/records.jsonl
  #[arg(long, value_name = "SOURCE")]
  input: Url,

  /// 预热记录数
  #[arg(long, default_value = "3", value_name = "COUNT")]
  warmup: usize,

  /// 多项式拟合阶数
  #[arg(long, default_value = "1", value_name = "DEGREE")]
  polyfit_degree: usize,

  /// 日志级别
  #[arg(long, default_value = "warn", value_name = "LEVEL")]
  log_level: tracing::Level,
}

fn main() -> Result<()> {
  let args = Args::parse();

  tracing_subscriber::fmt()
    .with_max_level(args.log_level)
    .with_writer(std::io::stderr)
    .init();

  let mut groups: BTreeMap<(String, Window), Vec<WindowedHealthRecord>> = BTreeMap::new();
  for record in open_input::<WindowedHealthRecord>(&args.input)? {
    match record.window() {
      Some(window) => groups
        .entry((record.session_id.clone(), window))
        .or_default()
        .push(record),
      None => warn!("记录缺少窗口信息，跳过: 会话 {}", record.session_id),
    }
  }
  info!("共 {} 个 (会话, 窗口) 分组", groups.len());

  let aggregator = TrendAggregator::new(args.warmup, args.polyfit_degree);
  for ((key, window), records) in &groups {
    if let Some(trend) = aggregator.aggregate(key, *window, records) {
      println!("{}", serde_json::to_string(&trend)?);
    }
  }

  Ok(())
}
