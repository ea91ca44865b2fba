// 该文件是 Mianjing （面镜） 项目的一部分。
// src/frame.rs - 像素帧定义
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

use crate::resample::ResampleError;

/// 像素排布格式，决定每像素字节数与行步长
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
  /// RGBA，每像素 4 字节，行紧密排列
  Rgba,
  /// RGB，每像素 3 字节，行按 4 字节对齐填充
  RgbPadded,
  /// RGB，每像素 3 字节，行紧密排列
  #[default]
  Rgb,
}

impl PixelFormat {
  pub fn channels(self) -> usize {
    match self {
      PixelFormat::Rgba => 4,
      PixelFormat::RgbPadded | PixelFormat::Rgb => 3,
    }
  }

  /// 行步长（字节）
  pub fn stride(self, width: u32) -> usize {
    let width = width as usize;
    match self {
      PixelFormat::Rgba => width * 4,
      PixelFormat::RgbPadded => (width * 3).div_ceil(4) * 4,
      PixelFormat::Rgb => width * 3,
    }
  }

  pub fn buffer_size(self, width: u32, height: u32) -> usize {
    self.stride(width) * height as usize
  }
}

impl std::str::FromStr for PixelFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "rgba" | "RGBA" => Ok(PixelFormat::Rgba),
      "rgb-padded" | "rgb_padded" => Ok(PixelFormat::RgbPadded),
      "rgb" | "RGB" => Ok(PixelFormat::Rgb),
      other => Err(format!("未知的像素格式: {}", other)),
    }
  }
}

/// 拥有所有权的打包像素缓冲区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
  width: u32,
  height: u32,
  format: PixelFormat,
  data: Box<[u8]>,
}

impl PixelFrame {
  /// 以给定几何信息包装数据，长度必须与声明的尺寸和格式一致
  pub fn new(
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
  ) -> Result<Self, ResampleError> {
    let expected = format.buffer_size(width, height);
    if data.len() != expected {
      return Err(ResampleError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      format,
      data: data.into_boxed_slice(),
    })
  }

  /// 全零帧
  pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> Self {
    let data = vec![0u8; format.buffer_size(width, height)].into_boxed_slice();
    Self {
      width,
      height,
      format,
      data,
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn channels(&self) -> usize {
    self.format.channels()
  }

  pub fn stride(&self) -> usize {
    self.format.stride(self.width)
  }

  /// 像素 (x, y) 的字节偏移
  pub fn offset(&self, x: u32, y: u32) -> usize {
    y as usize * self.stride() + x as usize * self.channels()
  }

  pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
    let offset = self.offset(x, y);
    &self.data[offset..offset + self.channels()]
  }

  pub fn into_inner(self) -> Vec<u8> {
    self.data.into_vec()
  }
}

#[cfg(feature = "image")]
impl PixelFrame {
  /// 按指定格式打包解码后的图像
  pub fn from_image(image: &image::DynamicImage, format: PixelFormat) -> Self {
    let (width, height) = (image.width(), image.height());
    let data = match format {
      PixelFormat::Rgba => image.to_rgba8().into_raw().into_boxed_slice(),
      PixelFormat::Rgb => image.to_rgb8().into_raw().into_boxed_slice(),
      PixelFormat::RgbPadded => {
        let packed = image.to_rgb8();
        let stride = format.stride(width);
        if width == 0 {
          return Self::zeroed(width, height, format);
        }
        let mut data = vec![0u8; format.buffer_size(width, height)];
        for (dst, src) in data
          .chunks_exact_mut(stride)
          .zip(packed.as_raw().chunks_exact(width as usize * 3))
        {
          dst[..src.len()].copy_from_slice(src);
        }
        data.into_boxed_slice()
      }
    };

    Self {
      width,
      height,
      format,
      data,
    }
  }

  /// 转为紧密排列的 RGB 图像，丢弃 alpha 与行填充
  pub fn to_rgb_image(&self) -> image::RgbImage {
    image::RgbImage::from_fn(self.width, self.height, |x, y| {
      let p = self.pixel(x, y);
      image::Rgb([p[0], p[1], p[2]])
    })
  }
}

impl AsRef<[u8]> for PixelFrame {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

impl AsMut<[u8]> for PixelFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strides_follow_format() {
    assert_eq!(PixelFormat::Rgba.stride(5), 20);
    assert_eq!(PixelFormat::Rgb.stride(5), 15);
    assert_eq!(PixelFormat::RgbPadded.stride(5), 16);
    assert_eq!(PixelFormat::RgbPadded.stride(4), 12);
    assert_eq!(PixelFormat::RgbPadded.stride(1), 4);
  }

  #[test]
  fn rejects_wrong_buffer_length() {
    let result = PixelFrame::new(3, 2, PixelFormat::RgbPadded, vec![0u8; 18]);
    assert_eq!(
      result.unwrap_err(),
      ResampleError::BufferSizeMismatch {
        expected: 24,
        actual: 18
      }
    );
    assert!(PixelFrame::new(3, 2, PixelFormat::Rgb, vec![0u8; 18]).is_ok());
  }

  #[test]
  fn pixel_addresses_respect_padding() {
    let mut data = vec![0u8; PixelFormat::RgbPadded.buffer_size(3, 2)];
    data[12..15].copy_from_slice(&[1, 2, 3]);
    let frame = PixelFrame::new(3, 2, PixelFormat::RgbPadded, data).unwrap();
    assert_eq!(frame.pixel(0, 1), &[1, 2, 3]);
  }

  #[cfg(feature = "image")]
  #[test]
  fn image_conversion_respects_padding() {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(3, 2, |x, y| {
      image::Rgb([x as u8, y as u8, 7])
    }));
    let frame = PixelFrame::from_image(&image, PixelFormat::RgbPadded);
    assert_eq!(frame.stride(), 12);
    assert_eq!(frame.pixel(2, 1), &[2, 1, 7]);
    assert_eq!(frame.to_rgb_image(), image.to_rgb8());

    let rgba = PixelFrame::from_image(&image, PixelFormat::Rgba);
    assert_eq!(rgba.pixel(1, 0), &[1, 0, 7, 255]);
  }

  #[test]
  fn parses_format_names() {
    assert_eq!("rgba".parse::<PixelFormat>(), Ok(PixelFormat::Rgba));
    assert_eq!("rgb-padded".parse::<PixelFormat>(), Ok(PixelFormat::RgbPadded));
    assert!("yuv".parse::<PixelFormat>().is_err());
  }
}
