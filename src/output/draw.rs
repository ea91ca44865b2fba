// 该文件是 Mianjing （面镜） 项目的一部分。
// src/output/draw.rs - 裁剪结果可视化与记录
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

use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde_json::json;

use crate::{cropper::CropResult, frame::PixelFrame};

const REGION_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const DETECTION_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const LINE_THICKNESS: i32 = 2;

pub struct Draw {
  region_color: [u8; 3],
  detection_color: [u8; 3],
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      region_color: REGION_COLOR,
      detection_color: DETECTION_COLOR,
      thickness: LINE_THICKNESS,
    }
  }
}

impl Draw {
  // 向内逐像素收缩绘制，得到加粗的边框
  fn outline(&self, image: &mut RgbImage, x: i32, y: i32, w: i32, h: i32, color: [u8; 3]) {
    for t in 0..self.thickness {
      let (w, h) = (w - 2 * t, h - 2 * t);
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x + t, y + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }
  }

  /// 在源帧上绘制裁剪区域和检测框
  pub fn draw_result(&self, frame: &PixelFrame, result: &CropResult) -> RgbImage {
    let mut image = frame.to_rgb_image();

    let r = &result.region;
    self.outline(
      &mut image,
      r.x as i32,
      r.y as i32,
      r.width as i32,
      r.height as i32,
      self.region_color,
    );

    if let Some(d) = &result.detection {
      self.outline(&mut image, d.x, d.y, d.width, d.height, self.detection_color);
    }

    image
  }
}

pub struct Record;

impl Record {
  pub fn record(&self, result: &CropResult, path: &Path) -> Result<(), std::io::Error> {
    let region = &result.region;
    let record = json!({
      "frame_index": result.frame_index,
      "region": {
        "x": region.x,
        "y": region.y,
        "width": region.width,
        "height": region.height,
      },
      "detection": result.detection.map(|d| json!({
        "x": d.x,
        "y": d.y,
        "width": d.width,
        "height": d.height,
        "probability": d.probability,
      })),
    });
    std::fs::write(path.with_extension("json"), record.to_string())?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{decode::Detection, frame::PixelFormat, region::CropRegion};

  fn result(detection: Option<Detection>) -> CropResult {
    CropResult {
      frame_index: 7,
      detection,
      region: CropRegion {
        x: 2,
        y: 2,
        width: 8,
        height: 8,
      },
      cropped: PixelFrame::zeroed(4, 4, PixelFormat::Rgb),
    }
  }

  #[test]
  fn outlines_region_on_source() {
    let frame = PixelFrame::zeroed(16, 16, PixelFormat::Rgba);
    let image = Draw::default().draw_result(&frame, &result(None));
    assert_eq!(image.get_pixel(2, 2), &Rgb(REGION_COLOR));
    assert_eq!(image.get_pixel(3, 5), &Rgb(REGION_COLOR));
    assert_eq!(image.get_pixel(5, 5), &Rgb([0, 0, 0]));
    assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
  }

  #[test]
  fn writes_json_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let detection = Detection {
      x: 3,
      y: 4,
      width: 5,
      height: 6,
      probability: 0.5,
      valid: true,
    };
    Record.record(&result(Some(detection)), &path).unwrap();

    let text = std::fs::read_to_string(dir.path().join("frame.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["frame_index"], 7);
    assert_eq!(value["region"]["width"], 8);
    assert_eq!(value["detection"]["height"], 6);

    Record.record(&result(None), &path).unwrap();
    let text = std::fs::read_to_string(dir.path().join("frame.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value["detection"].is_null());
  }
}
