// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// tests/pipeline.rs - 流水线集成测试
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

use chrono::{DateTime, TimeZone, Utc};

use healthtrend::{
  config::EngineConfig,
  detection::{AnnotatedImage, DetectItem, DetectionSet, HealthWeightTable},
  monitor::{FnPolicy, MonitorContext, SessionMonitor},
  pipeline::{PipelineBuilder, WindowedPipeline},
  record::ImageMetadata,
  render::AlertEventType,
  state::{InMemoryKeyedState, KeyedState},
  window::{FixedWindows, Window},
};

fn fixed_clock() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
}

fn image(session: &str, ts: f64, items: Vec<DetectItem>) -> AnnotatedImage {
  AnnotatedImage {
    metadata: ImageMetadata {
      ts,
      session_id: session.to_string(),
      user_id: 42,
      device_id: 7,
      cloud_device_id: Some(70),
      client_version: "1.2.3".to_string(),
    },
    detections: DetectionSet::new(items),
  }
}

fn item(class_id: u32, score: f32) -> DetectItem {
  DetectItem {
    class_id,
    score,
    bbox: [0.2, 0.2, 0.3, 0.3],
  }
}

/// 类别 2 权重 +1，类别 5 权重 -1
fn signed_weights() -> HealthWeightTable {
  HealthWeightTable::from_pairs([(2, 1.0), (3, 1.0), (5, -1.0)])
}

fn pipeline(config: EngineConfig) -> WindowedPipeline {
  PipelineBuilder::new(config)
    .weights(signed_weights())
    .assigner(FixedWindows::new(300).unwrap())
    .clock(fixed_clock)
    .build()
    .unwrap()
}

#[test]
fn end_to_end_trend_and_render() {
  let mut pipeline = pipeline(EngineConfig::default());
  // 0.3 的检测被阈值过滤；该时间点的值为 0.9 - 0.8 = 0.1
  pipeline.push(image(
    "session-a",
    1.0,
    vec![item(2, 0.9), item(5, 0.8), item(3, 0.3)],
  ));
  pipeline.push(image("session-a", 2.0, vec![item(2, 0.9)]));

  let results = pipeline.flush();
  assert_eq!(results.len(), 1);
  let result = &results[0];
  assert_eq!(result.window, Window { start: 0, end: 300 });
  assert_eq!(result.records.len(), 3);
  assert!(result.pane().is_last);

  let trend = &result.monitor.trends[0];
  assert_eq!(trend.ts, vec![1.0, 2.0]);
  assert!((trend.cumsum[0] - 0.1).abs() < 1e-6);
  assert!((trend.cumsum[1] - 1.0).abs() < 1e-6);
  assert_eq!(trend.poly_degree, 1);
  assert!((trend.slope().unwrap() - 0.9).abs() < 1e-6);
  assert!((trend.poly_coef[0] + 0.8).abs() < 1e-6);
  assert_eq!(trend.metadata.window_start, Some(0));
  assert_eq!(trend.metadata.window_end, Some(300));

  let render = result.render.as_ref().unwrap();
  assert_eq!(render.event_type, AlertEventType::VideoDone);
  assert_eq!(render.session_id, "session-a");
  assert_eq!(
    render.source_path,
    "dataflow/telemetry_event/annotated_images/session-a"
  );
  assert_eq!(
    render.destination_path,
    "dataflow/telemetry_event/annotated_video/session-a/2024/05/06/annotated_video.mp4"
  );
  assert_eq!(
    render.cdn_relative,
    "uploads/annotated_video/session-a/2024/05/06/annotated_video.mp4"
  );
  assert_eq!(
    render.cdn_output,
    "https://cdn.healthtrend.dev/uploads/annotated_video/session-a/2024/05/06/annotated_video.mp4"
  );
  assert_eq!(render.metadata.window_start, None);
  assert_eq!(render.metadata.user_id, 42);
}

#[test]
fn trend_does_not_depend_on_arrival_order() {
  let events = vec![
    image("s", 3.0, vec![item(2, 0.7), item(5, 0.9)]),
    image("s", 1.0, vec![item(2, 0.9), item(5, 0.8)]),
    image("s", 2.0, vec![item(3, 0.95)]),
    image("s", 1.0, vec![item(3, 0.85)]),
  ];

  let mut forward = pipeline(EngineConfig::default());
  for e in events.iter().cloned() {
    forward.push(e);
  }
  let mut backward = pipeline(EngineConfig::default());
  for e in events.iter().rev().cloned() {
    backward.push(e);
  }

  let a = forward.flush();
  let b = backward.flush();
  assert_eq!(a.len(), 1);
  assert_eq!(a[0].monitor.trends, b[0].monitor.trends);
  assert_eq!(a[0].render, b[0].render);
}

#[test]
fn accumulating_panes_recompute_full_window() {
  let mut pipeline = pipeline(EngineConfig::default());
  for t in 0..3 {
    pipeline.push(image("s", t as f64, vec![item(2, 0.9)]));
  }
  let early = pipeline.advance_watermark(10.0);
  assert_eq!(early.len(), 1);
  assert_eq!(early[0].monitor.trends[0].ts.len(), 3);
  assert!(early[0].render.is_none());

  pipeline.push(image("s", 20.0, vec![item(2, 0.9)]));
  let last = pipeline.flush();
  assert_eq!(last.len(), 1);
  assert_eq!(last[0].monitor.trends[0].ts, vec![0.0, 1.0, 2.0, 20.0]);
  assert!(last[0].render.is_some());
}

#[test]
fn default_sliding_windows_render_once_per_session() {
  let mut pipeline = PipelineBuilder::new(EngineConfig::default())
    .weights(signed_weights())
    .clock(fixed_clock)
    .build()
    .unwrap();
  for t in 0..4 {
    pipeline.push(image("s", t as f64, vec![item(2, 0.9)]));
  }
  let results = pipeline.flush();
  // 300 秒窗口、30 秒步长，每个时间戳落入 10 个窗口
  assert_eq!(results.len(), 10);
  let renders: Vec<_> = results.iter().filter_map(|r| r.render.as_ref()).collect();
  assert_eq!(renders.len(), 1);
  assert_eq!(
    renders[0].destination_path,
    "dataflow/telemetry_event/annotated_video/s/2024/05/06/annotated_video.mp4"
  );
  assert_eq!(pipeline.monitor().state().get("s"), 0);
}

#[test]
fn failure_counters_are_per_session() {
  let mut pipeline = pipeline(EngineConfig::default());
  pipeline.push(image("a", 1.0, vec![item(2, 0.9)]));
  pipeline.push(image("b", 1.0, vec![item(2, 0.9)]));
  let first = pipeline.advance_watermark(5.0);
  assert_eq!(first.len(), 2);
  assert!(first.iter().all(|r| r.monitor.failures_before == 0));

  pipeline.push(image("a", 6.0, vec![item(2, 0.9)]));
  let second = pipeline.advance_watermark(8.0);
  assert_eq!(second.len(), 1);
  assert_eq!(second[0].key, "a");
  assert_eq!(second[0].monitor.failures_before, 1);
  assert_eq!(second[0].monitor.failures, 2);

  assert_eq!(pipeline.monitor().state().get("a"), 2);
  assert_eq!(pipeline.monitor().state().get("b"), 1);
}

#[test]
fn caller_policy_controls_alert_and_completion() {
  let monitor = SessionMonitor::new(InMemoryKeyedState::new()).with_policy(FnPolicy::new(
    |ctx: &MonitorContext<'_>| ctx.failures_before >= 1,
    |ctx: &MonitorContext<'_>| ctx.failures >= 2,
  ));
  let mut pipeline = PipelineBuilder::new(EngineConfig::default())
    .weights(signed_weights())
    .assigner(FixedWindows::new(300).unwrap())
    .clock(fixed_clock)
    .monitor(monitor)
    .build()
    .unwrap();

  pipeline.push(image("s", 1.0, vec![item(2, 0.9)]));
  let first = pipeline.advance_watermark(2.0);
  assert!(!first[0].monitor.alert);
  assert!(first[0].render.is_none());

  pipeline.push(image("s", 3.0, vec![item(2, 0.9)]));
  let second = pipeline.advance_watermark(4.0);
  assert!(second[0].monitor.alert);
  assert!(second[0].monitor.is_final);
  // 策略判定完成时即使不是最后一次触发也发送渲染消息
  assert!(!second[0].pane().is_last);
  assert!(second[0].render.is_some());
}

#[test]
fn warmup_suppresses_trend_but_still_counts() {
  let mut pipeline = pipeline(EngineConfig::default().with_warmup(5));
  for t in 0..3 {
    pipeline.push(image("s", t as f64, vec![item(2, 0.9)]));
  }
  let results = pipeline.flush();
  assert_eq!(results.len(), 1);
  assert!(results[0].monitor.trends.is_empty());
  assert_eq!(results[0].monitor.failures, 1);
  assert!(results[0].render.is_some());
}

#[cfg(all(
  feature = "jsonl_input",
  feature = "jsonl_output",
  feature = "directory_calibration"
))]
mod jsonl {
  use std::fs;
  use std::io::Write;

  use url::Url;

  use healthtrend::{
    FromUrl,
    calibration::DirectoryCalibrationStore,
    input::open_input,
    output::{OutputRecord, OutputWrapper},
    task::{ContinuousTask, Task},
  };

  use super::*;

  #[test]
  fn file_to_file_with_calibration() {
    let dir = tempfile::tempdir().unwrap();

    // 设备 7 只关注画面左上角
    let calib_dir = dir.path().join("calibration");
    fs::create_dir_all(calib_dir.join("7")).unwrap();
    fs::write(
      calib_dir.join("7").join("calibration.json"),
      r#"{"coordinates": [0.0, 0.0, 0.5, 0.5]}"#,
    )
    .unwrap();

    let input_path = dir.path().join("events.jsonl");
    let mut file = fs::File::create(&input_path).unwrap();
    for t in 0..4 {
      let mut event = image("s", t as f64, vec![item(2, 0.9)]);
      if t == 3 {
        // 落在关注区域之外，被过滤
        event.detections = DetectionSet::new(vec![DetectItem {
          class_id: 2,
          score: 0.9,
          bbox: [0.7, 0.7, 0.9, 0.9],
        }]);
      }
      writeln!(file, "{}", serde_json::to_string(&event).unwrap()).unwrap();
    }
    writeln!(file, "not json").unwrap();
    drop(file);

    let output_path = dir.path().join("out").join("trends.jsonl");
    let input_url = Url::from_file_path(&input_path).unwrap();
    let output_url = Url::from_file_path(&output_path).unwrap();
    let calib_url = Url::parse(&format!("folder://{}", calib_dir.display())).unwrap();

    let mut pipeline = PipelineBuilder::new(EngineConfig::default().with_early_firing(false))
      .weights(signed_weights())
      .assigner(FixedWindows::new(300).unwrap())
      .calibration(DirectoryCalibrationStore::from_url(&calib_url).unwrap())
      .clock(fixed_clock)
      .build()
      .unwrap();
    let input = open_input::<AnnotatedImage>(&input_url).unwrap();
    let mut output = OutputWrapper::from_url(&output_url).unwrap();

    let summary = ContinuousTask::default()
      .run_task(input, &mut pipeline, &mut output)
      .unwrap();
    assert_eq!(summary.events, 4);
    assert_eq!(summary.panes, 1);
    assert_eq!(summary.trends, 1);
    assert_eq!(summary.renders, 1);

    let written: Vec<OutputRecord> = fs::read_to_string(&output_path)
      .unwrap()
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect();
    assert_eq!(written.len(), 2);
    match &written[0] {
      OutputRecord::Trend(trend) => {
        assert_eq!(trend.ts, vec![0.0, 1.0, 2.0]);
        assert_eq!(trend.session_id, "s");
      }
      other => panic!("unexpected record: {:?}", other),
    }
    assert!(matches!(written[1], OutputRecord::Render(_)));
  }
}
