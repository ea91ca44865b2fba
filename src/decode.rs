// 该文件是 Mianjing （面镜） 项目的一部分。
// src/decode.rs - 检测器输出解码
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

use thiserror::Error;
use tracing::{debug, error};

use crate::anchor::{Anchor, AnchorTable};

/// 每个槽位的回归值数量（前 4 个为框偏移，其余为关键点，本库不使用）
pub const BLAZEFACE_NUM_COORD: usize = 16;

const LOGIT_LIMIT: f32 = 100.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("检测器输出大小不匹配: 回归 {boxes} 个值, 分数 {scores} 个值")]
  ShapeMismatch { boxes: usize, scores: usize },
  #[error("槽位数量不匹配: 检测器 {slots} 个, 先验框 {anchors} 个")]
  SlotCountMismatch { slots: usize, anchors: usize },
}

/// 单帧检测器原始输出（框回归 + 置信度 logit）
#[derive(Debug, Clone, Copy)]
pub struct DetectorOutput<'a> {
  box_regressions: &'a [f32],
  scores: &'a [f32],
}

impl<'a> DetectorOutput<'a> {
  pub fn new(box_regressions: &'a [f32], scores: &'a [f32]) -> Result<Self, DecodeError> {
    if box_regressions.len() != scores.len() * BLAZEFACE_NUM_COORD {
      error!(
        "检测器输出大小不匹配: 回归 {}, 分数 {}",
        box_regressions.len(),
        scores.len()
      );
      return Err(DecodeError::ShapeMismatch {
        boxes: box_regressions.len(),
        scores: scores.len(),
      });
    }

    Ok(DetectorOutput {
      box_regressions,
      scores,
    })
  }

  pub fn num_slots(&self) -> usize {
    self.scores.len()
  }

  /// 第 `slot` 个槽位的 (dx, dy, dw, dh) 与 logit
  fn slot(&self, slot: usize) -> ([f32; 4], f32) {
    let offset = slot * BLAZEFACE_NUM_COORD;
    let r = &self.box_regressions[offset..offset + 4];
    ([r[0], r[1], r[2], r[3]], self.scores[slot])
  }
}

/// 解码参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
  pub image_width: u32,
  pub image_height: u32,
  pub x_scale: f32,
  pub y_scale: f32,
  pub w_scale: f32,
  pub h_scale: f32,
  pub score_threshold: f32,
}

impl Default for DecodeParams {
  fn default() -> Self {
    Self {
      image_width: 720,
      image_height: 720,
      x_scale: 128.0,
      y_scale: 128.0,
      w_scale: 128.0,
      h_scale: 128.0,
      score_threshold: 0.5,
    }
  }
}

/// 像素坐标下的检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
  pub probability: f32,
  pub valid: bool,
}

impl Detection {
  pub fn area(&self) -> f32 {
    self.width as f32 * self.height as f32
  }
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 将 logit 截断到 [-100, 100] 后映射为概率
pub fn calibrate_score(logit: f32) -> f32 {
  sigmoid(logit.clamp(-LOGIT_LIMIT, LOGIT_LIMIT))
}

/// 解码单个槽位
pub fn decode_slot(
  regression: [f32; 4],
  logit: f32,
  anchor: &Anchor,
  params: &DecodeParams,
) -> Detection {
  let [dx, dy, dw, dh] = regression;

  let x_center = dx / params.x_scale * anchor.width + anchor.center_x;
  let y_center = dy / params.y_scale * anchor.height + anchor.center_y;
  let h = dh / params.h_scale * anchor.height;
  let w = dw / params.w_scale * anchor.width;

  let ymin = y_center - h / 2.0;
  let xmin = x_center - w / 2.0;
  let ymax = y_center + h / 2.0;
  let xmax = x_center + w / 2.0;

  let probability = calibrate_score(logit);

  let image_width = params.image_width as f32;
  let image_height = params.image_height as f32;

  // 浮点到整数的转换向零截断
  let x = ((xmin * image_width) as i32).max(0);
  let y = ((ymin * image_height) as i32).max(0);
  let width = (((xmax - xmin) * image_width) as i32).min(params.image_width as i32 - x);
  let height = (((ymax - ymin) * image_height) as i32).min(params.image_height as i32 - y);

  Detection {
    x,
    y,
    width,
    height,
    probability,
    valid: probability >= params.score_threshold,
  }
}

/// 解码所有槽位，结果顺序与槽位顺序一致
pub fn decode_all(
  output: &DetectorOutput<'_>,
  anchors: &AnchorTable,
  params: &DecodeParams,
) -> Result<Vec<Detection>, DecodeError> {
  if output.num_slots() != anchors.len() {
    error!(
      "槽位数量不匹配: 检测器 {}, 先验框 {}",
      output.num_slots(),
      anchors.len()
    );
    return Err(DecodeError::SlotCountMismatch {
      slots: output.num_slots(),
      anchors: anchors.len(),
    });
  }

  let detections: Vec<Detection> = anchors
    .iter()
    .enumerate()
    .map(|(slot, anchor)| {
      let (regression, logit) = output.slot(slot);
      decode_slot(regression, logit, anchor, params)
    })
    .collect();

  debug!(
    "解码 {} 个槽位, 其中 {} 个超过阈值",
    detections.len(),
    detections.iter().filter(|d| d.valid).count()
  );

  Ok(detections)
}

#[cfg(test)]
mod tests {
  use super::*;

  const UNIT_ANCHOR: Anchor = Anchor {
    center_x: 0.5,
    center_y: 0.5,
    width: 0.1,
    height: 0.1,
  };

  #[test]
  fn probability_stays_in_unit_interval() {
    for logit in [-1.0e30, -1000.0, -100.0, -5.0, 0.0, 5.0, 100.0, 1000.0, 1.0e30] {
      let p = calibrate_score(logit);
      assert!((0.0..=1.0).contains(&p), "logit {} -> {}", logit, p);
    }
    assert_eq!(calibrate_score(0.0), 0.5);
    assert_eq!(calibrate_score(1000.0), calibrate_score(100.0));
  }

  #[test]
  fn anchor_sized_box_maps_to_pixels() {
    let params = DecodeParams::default();
    let det = decode_slot([0.0, 0.0, 128.0, 128.0], 10.0, &UNIT_ANCHOR, &params);
    assert_eq!((det.x, det.y, det.width, det.height), (324, 324, 72, 72));
    assert!(det.valid);
    assert!(det.probability > 0.99);
  }

  #[test]
  fn offsets_move_center_by_anchor_units() {
    let params = DecodeParams::default();
    // dx = 128 移动一个先验框宽度 (0.1 * 720 = 72 像素)
    let det = decode_slot([128.0, 0.0, 128.0, 128.0], 0.0, &UNIT_ANCHOR, &params);
    assert!((det.x - 396).abs() <= 1, "x = {}", det.x);
    assert_eq!(det.y, 324);
    assert!(det.valid);
  }

  #[test]
  fn low_score_is_invalid() {
    let params = DecodeParams::default();
    let det = decode_slot([0.0; 4], -10.0, &UNIT_ANCHOR, &params);
    assert!(!det.valid);
    assert!(det.probability < 0.5);
  }

  #[test]
  fn boxes_are_clamped_to_the_frame() {
    let params = DecodeParams::default();
    let corner = Anchor {
      center_x: 0.0,
      center_y: 1.0,
      width: 0.2,
      height: 0.2,
    };
    let det = decode_slot([0.0, 0.0, 128.0, 128.0], 1.0, &corner, &params);
    assert_eq!(det.x, 0);
    assert!(det.y + det.height <= 720);
    assert!(det.x + det.width <= 720);
  }

  #[test]
  fn non_finite_logits_never_panic() {
    let params = DecodeParams::default();
    let det = decode_slot([f32::NAN; 4], f32::NAN, &UNIT_ANCHOR, &params);
    assert!(!det.valid);
  }

  #[test]
  fn shape_must_match_slots() {
    let boxes = vec![0.0f32; 16 * 3];
    let scores = vec![0.0f32; 4];
    assert_eq!(
      DetectorOutput::new(&boxes, &scores).unwrap_err(),
      DecodeError::ShapeMismatch {
        boxes: 48,
        scores: 4
      }
    );
  }

  #[test]
  fn slot_count_must_match_anchors() {
    let anchors = AnchorTable::parse("0.5 0.5\n0.5 0.5\n0.1 0.1\n0.1 0.1\n").unwrap();
    let boxes = vec![0.0f32; 16 * 3];
    let scores = vec![0.0f32; 3];
    let output = DetectorOutput::new(&boxes, &scores).unwrap();
    assert_eq!(
      decode_all(&output, &anchors, &DecodeParams::default()).unwrap_err(),
      DecodeError::SlotCountMismatch {
        slots: 3,
        anchors: 2
      }
    );
  }

  #[test]
  fn decode_all_keeps_slot_order() {
    let anchors = AnchorTable::parse("0.25 0.75\n0.5 0.5\n0.1 0.1\n0.1 0.1\n").unwrap();
    let mut boxes = vec![0.0f32; 16 * 2];
    boxes[2] = 128.0;
    boxes[3] = 128.0;
    boxes[16 + 2] = 128.0;
    boxes[16 + 3] = 128.0;
    let scores = [3.0f32, -3.0];
    let output = DetectorOutput::new(&boxes, &scores).unwrap();
    let detections = decode_all(&output, &anchors, &DecodeParams::default()).unwrap();
    assert_eq!(detections.len(), 2);
    assert!(detections[0].valid && !detections[1].valid);
    assert!(detections[0].x < detections[1].x);
  }
}
