// 该文件是 Mianjing （面镜） 项目的一部分。
// src/resample.rs - 最近邻裁剪缩放
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

use crate::{
  frame::{PixelFormat, PixelFrame},
  region::CropRegion,
  tensor::{ElementType, FramedTensor, TensorError},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResampleError {
  #[error("缓冲区大小与声明的尺寸不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("裁剪区域宽或高为 0: {0:?}")]
  DegenerateRegion(CropRegion),
  #[error("目标尺寸无效: {width}x{height}")]
  EmptyTarget { width: u32, height: u32 },
  #[error("裁剪区域 {region:?} 超出 {width}x{height} 的源图像")]
  RegionOutOfBounds {
    region: CropRegion,
    width: u32,
    height: u32,
  },
  #[error("像素格式通道数不一致: 输入 {from:?}, 输出 {to:?}")]
  FormatMismatch { from: PixelFormat, to: PixelFormat },
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("不支持的张量: {0}")]
  UnsupportedTensor(String),
}

/// 整帧叠加模式下的采样窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasSource {
  /// 源帧自身的裁剪子区域原位写回
  #[default]
  Region,
  /// 整个源帧缩放进裁剪区域
  FullFrame,
}

impl std::str::FromStr for CanvasSource {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "full" | "full-frame" | "full_frame" => Ok(CanvasSource::FullFrame),
      "region" => Ok(CanvasSource::Region),
      other => Err(format!("未知的采样窗口: {}", other)),
    }
  }
}

/// 最近邻映射：目标下标 `d`（目标长度 `dst`）对应的源下标（源长度 `src`）
pub fn nearest_index(src: u32, dst: u32, d: u32) -> u32 {
  let s = (src as f32 / dst as f32 * d as f32) as u32;
  s.min(src.saturating_sub(1))
}

/// 源缓冲区视图
struct Plane<'a> {
  data: &'a [u8],
  stride: usize,
  channels: usize,
}

/// 将源窗口 `window` 缩放写入目标的 `place` 位置
fn scale_window(source: &Plane<'_>, window: CropRegion, target: &mut PixelFrame, place: CropRegion) {
  let channels = source.channels;
  let target_stride = target.stride();
  let out = target.as_mut();

  for i in 0..place.height {
    let h_inp = window.y + nearest_index(window.height, place.height, i);
    let row_inp = h_inp as usize * source.stride;
    let row_out = (place.y + i) as usize * target_stride;
    for j in 0..place.width {
      let w_inp = window.x + nearest_index(window.width, place.width, j);
      let pix_inp = row_inp + w_inp as usize * channels;
      let pix_out = row_out + (place.x + j) as usize * channels;
      out[pix_out..pix_out + channels].copy_from_slice(&source.data[pix_inp..pix_inp + channels]);
    }
  }
}

fn whole(width: u32, height: u32) -> CropRegion {
  CropRegion {
    x: 0,
    y: 0,
    width,
    height,
  }
}

fn check_region(region: &CropRegion, width: u32, height: u32) -> Result<(), ResampleError> {
  if region.is_degenerate() {
    error!("裁剪区域宽或高为 0: {:?}", region);
    return Err(ResampleError::DegenerateRegion(*region));
  }
  if !region.fits_within(width, height) {
    error!("裁剪区域 {:?} 超出 {}x{} 的源图像", region, width, height);
    return Err(ResampleError::RegionOutOfBounds {
      region: *region,
      width,
      height,
    });
  }
  Ok(())
}

fn check_formats(from: PixelFormat, to: PixelFormat) -> Result<(), ResampleError> {
  if from.channels() != to.channels() {
    return Err(ResampleError::FormatMismatch { from, to });
  }
  Ok(())
}

/// 生成与源帧同尺寸的画布，仅裁剪区域内有像素，其余填零
pub fn crop_into_canvas(
  source: &PixelFrame,
  region: &CropRegion,
  canvas_source: CanvasSource,
) -> Result<PixelFrame, ResampleError> {
  check_region(region, source.width(), source.height())?;

  let window = match canvas_source {
    CanvasSource::FullFrame => whole(source.width(), source.height()),
    CanvasSource::Region => *region,
  };

  let plane = Plane {
    data: source.as_ref(),
    stride: source.stride(),
    channels: source.channels(),
  };
  let mut canvas = PixelFrame::zeroed(source.width(), source.height(), source.format());
  scale_window(&plane, window, &mut canvas, *region);
  Ok(canvas)
}

/// 将裁剪区域缩放到固定尺寸
pub fn crop_to_size(
  source: &PixelFrame,
  region: &CropRegion,
  width: u32,
  height: u32,
  format: PixelFormat,
) -> Result<PixelFrame, ResampleError> {
  if width == 0 || height == 0 {
    return Err(ResampleError::EmptyTarget { width, height });
  }
  check_formats(source.format(), format)?;
  check_region(region, source.width(), source.height())?;

  let plane = Plane {
    data: source.as_ref(),
    stride: source.stride(),
    channels: source.channels(),
  };
  let mut target = PixelFrame::zeroed(width, height, format);
  scale_window(&plane, *region, &mut target, whole(width, height));
  Ok(target)
}

/// 将已裁剪的 uint8 张量（维度 `channels:width:height`）缩放到固定尺寸
pub fn scale_tensor(
  buf: &[u8],
  width: u32,
  height: u32,
  format: PixelFormat,
) -> Result<PixelFrame, ResampleError> {
  if width == 0 || height == 0 {
    return Err(ResampleError::EmptyTarget { width, height });
  }

  let tensor = FramedTensor::parse(buf)?;
  if tensor.element_type() != ElementType::UInt8 {
    return Err(ResampleError::UnsupportedTensor(format!(
      "元素类型必须为 uint8, 实际为 {:?}",
      tensor.element_type()
    )));
  }

  let dims = tensor.dims();
  let (channels, src_width, src_height) = match dims {
    [c, w, h, rest @ ..] if rest.iter().all(|&d| d == 1) => (*c, *w, *h),
    other => {
      return Err(ResampleError::UnsupportedTensor(format!(
        "维度必须为 channels:width:height, 实际为 {:?}",
        other
      )));
    }
  };
  debug!("张量维度: {}:{}:{}", channels, src_width, src_height);
  if src_width == 0 || src_height == 0 {
    return Err(ResampleError::UnsupportedTensor(format!(
      "源尺寸无效: {}x{}",
      src_width, src_height
    )));
  }

  let source_format = match channels {
    3 => PixelFormat::Rgb,
    4 => PixelFormat::Rgba,
    other => {
      return Err(ResampleError::UnsupportedTensor(format!(
        "不支持的通道数: {}",
        other
      )));
    }
  };
  check_formats(source_format, format)?;

  let plane = Plane {
    data: tensor.payload(),
    stride: source_format.stride(src_width),
    channels: channels as usize,
  };
  let window = whole(src_width, src_height);
  let mut target = PixelFrame::zeroed(width, height, format);
  scale_window(&plane, window, &mut target, whole(width, height));
  Ok(target)
}
