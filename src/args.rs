// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use healthtrend::{
  config::EngineConfig,
  render::{self, RenderPaths},
};

/// Healthtrend 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源（JSON Lines，每行一帧检测结果），例如 file:///data/events.jsonl
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径，例如 file:///data/trends.jsonl
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 设备标定目录，例如 folder:///data/device_calibration
  #[arg(long, value_name = "CALIBRATION")]
  pub calibration: Option<Url>,

  /// 健康权重表 JSON 文件，缺省使用内置表
  #[arg(long, value_name = "FILE")]
  pub weights: Option<PathBuf>,

  /// 日志级别
  #[arg(long, default_value = "info", value_name = "LEVEL")]
  pub log_level: tracing::Level,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.66", value_name = "THRESHOLD")]
  pub min_score_threshold: f32,

  /// 检测框落入关注区域的最小比例 (0.0 - 1.0)
  #[arg(long, default_value = "0.75", value_name = "RATIO")]
  pub min_calibration_overlap: f32,

  /// 滑动窗口长度（秒）
  #[arg(long, default_value = "300", value_name = "SECONDS")]
  pub health_window_size: i64,

  /// 滑动窗口步长（秒）
  #[arg(long, default_value = "30", value_name = "SECONDS")]
  pub health_window_period: i64,

  /// 窗口关闭后仍接受迟到数据的时长（秒）
  #[arg(long, default_value = "0", value_name = "SECONDS")]
  pub allowed_lateness: i64,

  /// 事件允许的最大乱序延迟（秒）
  #[arg(long, default_value = "0", value_name = "SECONDS")]
  pub max_delay: f64,

  /// 预热记录数
  #[arg(long, default_value = "3", value_name = "COUNT")]
  pub warmup: usize,

  /// 多项式拟合阶数
  #[arg(long, default_value = "1", value_name = "DEGREE")]
  pub polyfit_degree: usize,

  /// 只在窗口关闭时触发，不做提前触发
  #[arg(long)]
  pub no_early_firing: bool,

  /// 最大处理事件数（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_events: usize,

  /// 渲染服务读取标注图像的基础路径
  #[arg(long, default_value = render::DEFAULT_IN_BASE)]
  pub render_in_base: String,

  /// 渲染视频的输出基础路径
  #[arg(long, default_value = render::DEFAULT_OUT_BASE)]
  pub render_out_base: String,

  /// CDN 基础地址
  #[arg(long, default_value = render::DEFAULT_CDN_BASE)]
  pub cdn_base: String,

  /// CDN 上传目录
  #[arg(long, default_value = render::DEFAULT_CDN_UPLOAD)]
  pub cdn_upload: String,

  /// 存储桶
  #[arg(long, default_value = render::DEFAULT_BUCKET)]
  pub bucket: String,
}

impl Args {
  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig::default()
      .with_score_threshold(self.min_score_threshold)
      .with_min_calibration_overlap(self.min_calibration_overlap)
      .with_window(self.health_window_size, self.health_window_period)
      .with_allowed_lateness(self.allowed_lateness)
      .with_warmup(self.warmup)
      .with_polyfit_degree(self.polyfit_degree)
      .with_early_firing(!self.no_early_firing)
  }

  pub fn render_paths(&self) -> RenderPaths {
    RenderPaths {
      in_base: self.render_in_base.clone(),
      out_base: self.render_out_base.clone(),
      cdn_base: self.cdn_base.clone(),
      cdn_upload: self.cdn_upload.clone(),
      bucket: self.bucket.clone(),
    }
  }
}
