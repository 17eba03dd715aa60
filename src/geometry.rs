// 该文件是 Healthtrend （健康趋势） 项目的一部分。
// src/geometry.rs - 检测框与关注区域的重叠计算
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

/// 检测框落在关注区域内的面积占检测框自身面积的比例
///
/// 分母是检测框面积而不是并集面积，所以这不是对称的 IoU。
/// 两个参数均为 `[x_min, y_min, x_max, y_max]`。
pub fn fractional_overlap(bbox: &[f32; 4], aoi: &[f32; 4]) -> f32 {
  let x_left = aoi[0].max(bbox[0]);
  let y_top = aoi[1].max(bbox[1]);
  let x_right = aoi[2].min(bbox[2]);
  let y_bottom = aoi[3].min(bbox[3]);

  // 不相交
  if x_right < x_left || y_bottom < y_top {
    return 0.0;
  }

  let intersection_area = (x_right - x_left) * (y_bottom - y_top);
  let box_area = (bbox[2] - bbox[0]) * (bbox[3] - bbox[1]);
  // 退化的检测框（零面积）没有可落入区域的面积
  if box_area <= 0.0 {
    return 0.0;
  }

  let ratio = intersection_area / box_area;
  if ratio >= 1.0 { 1.0 } else { ratio }
}
