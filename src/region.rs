// 该文件是 Mianjing （面镜） 项目的一部分。
// src/region.rs - 裁剪区域生成与编码
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

use tracing::debug;

use crate::{
  decode::Detection,
  tensor::{ElementType, FramedTensor, TensorError},
};

/// 裁剪信息的线格式大小：4 个 u32
pub const CROP_INFO_SIZE: usize = 16;

/// 正方形裁剪区域（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRegion {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// 没有检测结果时的回退区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyRegionPolicy {
  /// 整帧 `{0, 0, size, size}`
  #[default]
  FullFrame,
  /// 退化的 `{0, 0, 1, 1}`
  Unit,
}

impl std::str::FromStr for EmptyRegionPolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "full" | "full-frame" | "full_frame" => Ok(EmptyRegionPolicy::FullFrame),
      "unit" => Ok(EmptyRegionPolicy::Unit),
      other => Err(format!("未知的回退策略: {}", other)),
    }
  }
}

impl CropRegion {
  pub fn full_frame(frame_size: u32) -> Self {
    CropRegion {
      x: 0,
      y: 0,
      width: frame_size,
      height: frame_size,
    }
  }

  pub fn fallback(policy: EmptyRegionPolicy, frame_size: u32) -> Self {
    match policy {
      EmptyRegionPolicy::FullFrame => Self::full_frame(frame_size),
      EmptyRegionPolicy::Unit => CropRegion {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
      },
    }
  }

  pub fn is_degenerate(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  /// 是否完整位于 `width x height` 的帧内
  pub fn fits_within(&self, width: u32, height: u32) -> bool {
    self.x as u64 + self.width as u64 <= width as u64
      && self.y as u64 + self.height as u64 <= height as u64
  }

  /// 编码为原生字节序的 `{x, y, width, height}`
  pub fn to_ne_bytes(&self) -> [u8; CROP_INFO_SIZE] {
    let mut bytes = [0u8; CROP_INFO_SIZE];
    for (chunk, value) in bytes
      .chunks_exact_mut(4)
      .zip([self.x, self.y, self.width, self.height])
    {
      chunk.copy_from_slice(&value.to_ne_bytes());
    }
    bytes
  }

  pub fn from_ne_bytes(bytes: &[u8]) -> Result<Self, TensorError> {
    if bytes.len() != CROP_INFO_SIZE {
      return Err(TensorError::SizeMismatch {
        expected: CROP_INFO_SIZE,
        actual: bytes.len(),
      });
    }

    let mut values = [0u32; 4];
    for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
      let mut word = [0u8; 4];
      word.copy_from_slice(chunk);
      *value = u32::from_ne_bytes(word);
    }

    let [x, y, width, height] = values;
    Ok(CropRegion {
      x,
      y,
      width,
      height,
    })
  }

  /// 编码为 `4:1` 的 uint32 张量缓冲区
  pub fn to_tensor(&self) -> Result<Vec<u8>, TensorError> {
    FramedTensor::encode(ElementType::UInt32, &[4, 1], &self.to_ne_bytes())
  }

  /// 从张量缓冲区解析裁剪信息
  pub fn from_tensor(buf: &[u8]) -> Result<Self, TensorError> {
    let tensor = FramedTensor::parse(buf)?;
    if tensor.element_type() != ElementType::UInt32 {
      return Err(TensorError::UnknownElementType(tensor.element_type() as u32));
    }
    Self::from_ne_bytes(tensor.payload())
  }
}

/// 按边距扩展检测框并限制在帧内，生成正方形裁剪区域
pub fn synthesize(
  detection: Option<&Detection>,
  margin_rate: f32,
  frame_size: u32,
  policy: EmptyRegionPolicy,
) -> CropRegion {
  let Some(detection) = detection else {
    return CropRegion::fallback(policy, frame_size);
  };

  let frame_size = frame_size as i64;
  let base = detection.width.max(detection.height) as i64;
  let margin = (base as f32 * margin_rate) as i64;
  let size = (base + 2 * margin).min(frame_size);

  if size <= 0 {
    debug!("检测框尺寸无效: {:?}, 使用回退区域", detection);
    return CropRegion::fallback(policy, frame_size as u32);
  }

  let x = (detection.x as i64 - margin).max(0).min(frame_size - size);
  let y = (detection.y as i64 - margin).max(0).min(frame_size - size);

  CropRegion {
    x: x as u32,
    y: y as u32,
    width: size as u32,
    height: size as u32,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(x: i32, y: i32, width: i32, height: i32) -> Detection {
    Detection {
      x,
      y,
      width,
      height,
      probability: 0.9,
      valid: true,
    }
  }

  #[test]
  fn missing_detection_uses_policy() {
    assert_eq!(
      synthesize(None, 0.25, 720, EmptyRegionPolicy::FullFrame),
      CropRegion::full_frame(720)
    );
    assert_eq!(
      synthesize(None, 0.25, 720, EmptyRegionPolicy::Unit),
      CropRegion {
        x: 0,
        y: 0,
        width: 1,
        height: 1
      }
    );
  }

  #[test]
  fn expands_by_margin_around_detection() {
    let region = synthesize(
      Some(&det(324, 324, 72, 72)),
      0.25,
      720,
      EmptyRegionPolicy::FullFrame,
    );
    assert_eq!(
      region,
      CropRegion {
        x: 306,
        y: 306,
        width: 108,
        height: 108
      }
    );
  }

  #[test]
  fn uses_larger_side_and_truncated_margin() {
    // base = 30, margin = trunc(7.5) = 7
    let region = synthesize(
      Some(&det(100, 50, 20, 30)),
      0.25,
      720,
      EmptyRegionPolicy::FullFrame,
    );
    assert_eq!(
      region,
      CropRegion {
        x: 93,
        y: 43,
        width: 44,
        height: 44
      }
    );
  }

  #[test]
  fn clamps_into_frame() {
    let region = synthesize(
      Some(&det(700, 0, 40, 40)),
      0.25,
      720,
      EmptyRegionPolicy::FullFrame,
    );
    assert_eq!(region.x, 720 - 60);
    assert_eq!(region.y, 0);

    let huge = synthesize(
      Some(&det(0, 0, 700, 700)),
      0.25,
      720,
      EmptyRegionPolicy::FullFrame,
    );
    assert_eq!(huge, CropRegion::full_frame(720));
  }

  #[test]
  fn region_is_always_square_and_contained() {
    for frame_size in [1u32, 16, 128, 720] {
      for x in (-50..800).step_by(37) {
        for y in (-50..800).step_by(41) {
          for (w, h) in [(0, 0), (1, 3), (10, 10), (64, 20), (500, 900), (-5, 12)] {
            for margin_rate in [0.0f32, 0.25, 1.0] {
              let region = synthesize(
                Some(&det(x, y, w, h)),
                margin_rate,
                frame_size,
                EmptyRegionPolicy::FullFrame,
              );
              assert_eq!(region.width, region.height);
              assert!(region.fits_within(frame_size, frame_size), "{:?}", region);
              assert!(!region.is_degenerate());
            }
          }
        }
      }
    }
  }

  #[test]
  fn zero_sized_detection_falls_back() {
    let region = synthesize(
      Some(&det(360, 360, 0, 0)),
      0.25,
      720,
      EmptyRegionPolicy::FullFrame,
    );
    assert_eq!(region, CropRegion::full_frame(720));
  }

  #[test]
  fn crop_info_wire_format() {
    let region = CropRegion {
      x: 1,
      y: 2,
      width: 3,
      height: 4,
    };
    let bytes = region.to_ne_bytes();
    assert_eq!(&bytes[4..8], &2u32.to_ne_bytes());
    assert_eq!(CropRegion::from_ne_bytes(&bytes), Ok(region));
    assert!(CropRegion::from_ne_bytes(&bytes[..12]).is_err());

    let tensor = region.to_tensor().unwrap();
    assert_eq!(CropRegion::from_tensor(&tensor), Ok(region));
  }
}
