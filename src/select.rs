// 该文件是 Mianjing （面镜） 项目的一部分。
// src/select.rs - 非极大值抑制与最佳检测选择
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

use std::cmp::Ordering;

use tracing::debug;

use crate::decode::Detection;

/// 计算两个检测框的 IoU
///
/// 交集宽高按包含端点的像素约定计算（重叠长度 + 1），结果限制在 [0, 1]。
pub fn iou(a: &Detection, b: &Detection) -> f32 {
  let (ax, ay, aw, ah) = (a.x as i64, a.y as i64, a.width as i64, a.height as i64);
  let (bx, by, bw, bh) = (b.x as i64, b.y as i64, b.width as i64, b.height as i64);
  let x1 = ax.max(bx);
  let y1 = ay.max(by);
  let x2 = (ax + aw).min(bx + bw);
  let y2 = (ay + ah).min(by + bh);
  let w = (x2 - x1 + 1).max(0);
  let h = (y2 - y1 + 1).max(0);

  let inter = w as f32 * h as f32;
  if inter <= 0.0 {
    return 0.0;
  }

  let union = a.area() + b.area() - inter;
  // +1 约定下极小框的并集可能不为正，按完全重叠处理，保证正面积框与自身的 IoU 为 1
  if union <= 0.0 {
    return 1.0;
  }

  (inter / union).clamp(0.0, 1.0)
}

/// 贪心非极大值抑制，返回按概率降序排列的保留结果
pub fn suppress(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
  let mut results: Vec<Detection> = detections.iter().filter(|d| d.valid).copied().collect();

  // 稳定排序，概率相同时保持原有顺序
  results.sort_by(|a, b| {
    b.probability
      .partial_cmp(&a.probability)
      .unwrap_or(Ordering::Equal)
  });

  for i in 0..results.len() {
    if !results[i].valid {
      continue;
    }
    let current = results[i];
    for other in results.iter_mut().skip(i + 1) {
      if other.valid && iou(&current, other) > iou_threshold {
        other.valid = false;
      }
    }
  }

  results.retain(|d| d.valid);
  debug!("NMS 后保留 {} 个检测结果", results.len());
  results
}

/// 返回概率最高的保留结果
pub fn select(detections: &[Detection], iou_threshold: f32) -> Option<Detection> {
  suppress(detections, iou_threshold).into_iter().next()
}
