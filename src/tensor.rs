// 该文件是 Mianjing （面镜） 项目的一部分。
// src/tensor.rs - 带头部的张量缓冲区编解码
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

//! 头部布局（小端序，共 128 字节）：
//!
//! | 偏移 | 字段 |
//! |------|------|
//! | 0    | magic `0xfeedcced` |
//! | 4    | version |
//! | 8    | 元素类型 |
//! | 12   | dimension\[16\] |
//! | 76   | format（0 静态，1 可变） |
//! | 80   | media type |
//! | 84   | 填充至 128 |

use thiserror::Error;
use tracing::error;

pub const TENSOR_META_MAGIC: u32 = 0xfeed_cced;
pub const TENSOR_META_VERSION: u32 = 1;
pub const TENSOR_RANK_LIMIT: usize = 16;
pub const TENSOR_HEADER_SIZE: usize = 128;

const OFFSET_MAGIC: usize = 0;
const OFFSET_VERSION: usize = 4;
const OFFSET_TYPE: usize = 8;
const OFFSET_DIMENSION: usize = 12;
const OFFSET_FORMAT: usize = OFFSET_DIMENSION + 4 * TENSOR_RANK_LIMIT;
const OFFSET_MEDIA_TYPE: usize = OFFSET_FORMAT + 4;

const FORMAT_STATIC: u32 = 0;
const FORMAT_FLEXIBLE: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量缓冲区过短: {0} 字节")]
  TooShort(usize),
  #[error("张量头部魔数错误: {0:#010x}")]
  BadMagic(u32),
  #[error("不支持的张量头部版本: {0}")]
  UnsupportedVersion(u32),
  #[error("未知的元素类型: {0}")]
  UnknownElementType(u32),
  #[error("不支持的张量格式: {0}")]
  UnsupportedFormat(u32),
  #[error("张量维度数量超过上限 16: {0}")]
  RankTooLarge(usize),
  #[error("张量大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
  Int32 = 0,
  UInt32,
  Int16,
  UInt16,
  Int8,
  UInt8,
  Float64,
  Float32,
  Int64,
  UInt64,
  Float16,
}

impl ElementType {
  pub fn size(self) -> usize {
    match self {
      ElementType::Int8 | ElementType::UInt8 => 1,
      ElementType::Int16 | ElementType::UInt16 | ElementType::Float16 => 2,
      ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
      ElementType::Int64 | ElementType::UInt64 | ElementType::Float64 => 8,
    }
  }
}

impl TryFrom<u32> for ElementType {
  type Error = TensorError;

  fn try_from(value: u32) -> Result<Self, Self::Error> {
    let ty = match value {
      0 => ElementType::Int32,
      1 => ElementType::UInt32,
      2 => ElementType::Int16,
      3 => ElementType::UInt16,
      4 => ElementType::Int8,
      5 => ElementType::UInt8,
      6 => ElementType::Float64,
      7 => ElementType::Float32,
      8 => ElementType::Int64,
      9 => ElementType::UInt64,
      10 => ElementType::Float16,
      other => return Err(TensorError::UnknownElementType(other)),
    };
    Ok(ty)
  }
}

/// 张量头部信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorMeta {
  pub element_type: ElementType,
  pub dimension: [u32; TENSOR_RANK_LIMIT],
  pub format: u32,
  pub media_type: u32,
}

impl TensorMeta {
  pub fn header_size(&self) -> usize {
    TENSOR_HEADER_SIZE
  }

  /// 有效维度数量（遇到第一个 0 截止）
  pub fn rank(&self) -> usize {
    self
      .dimension
      .iter()
      .position(|&d| d == 0)
      .unwrap_or(TENSOR_RANK_LIMIT)
  }

  pub fn dims(&self) -> &[u32] {
    &self.dimension[..self.rank()]
  }

  /// 负载字节数；溢出时返回 None
  pub fn data_size(&self) -> Option<usize> {
    if self.rank() == 0 {
      return Some(0);
    }
    self
      .dims()
      .iter()
      .try_fold(self.element_type.size(), |acc, &d| {
        acc.checked_mul(d as usize)
      })
  }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
  let mut bytes = [0u8; 4];
  bytes.copy_from_slice(&buf[offset..offset + 4]);
  u32::from_le_bytes(bytes)
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
  buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// 借用缓冲区的张量视图：头部 + 紧随其后的负载
#[derive(Debug, Clone, Copy)]
pub struct FramedTensor<'a> {
  meta: TensorMeta,
  payload: &'a [u8],
}

impl<'a> FramedTensor<'a> {
  /// 解析张量缓冲区，头部大小与负载大小之和必须恰好等于缓冲区长度
  pub fn parse(buf: &'a [u8]) -> Result<Self, TensorError> {
    if buf.len() < TENSOR_HEADER_SIZE {
      error!("张量缓冲区过短: {} 字节", buf.len());
      return Err(TensorError::TooShort(buf.len()));
    }

    let magic = read_u32(buf, OFFSET_MAGIC);
    if magic != TENSOR_META_MAGIC {
      return Err(TensorError::BadMagic(magic));
    }

    let version = read_u32(buf, OFFSET_VERSION);
    if version != TENSOR_META_VERSION {
      return Err(TensorError::UnsupportedVersion(version));
    }

    let element_type = ElementType::try_from(read_u32(buf, OFFSET_TYPE))?;

    let mut dimension = [0u32; TENSOR_RANK_LIMIT];
    for (i, d) in dimension.iter_mut().enumerate() {
      *d = read_u32(buf, OFFSET_DIMENSION + 4 * i);
    }

    let format = read_u32(buf, OFFSET_FORMAT);
    if format != FORMAT_STATIC && format != FORMAT_FLEXIBLE {
      return Err(TensorError::UnsupportedFormat(format));
    }

    let meta = TensorMeta {
      element_type,
      dimension,
      format,
      media_type: read_u32(buf, OFFSET_MEDIA_TYPE),
    };

    let hsize = meta.header_size();
    let expected = meta
      .data_size()
      .and_then(|dsize| dsize.checked_add(hsize))
      .unwrap_or(usize::MAX);
    if expected != buf.len() {
      error!(
        "张量头部信息无效, 缓冲区大小不正确 (实际 {}, 期望 {})",
        buf.len(),
        expected
      );
      return Err(TensorError::SizeMismatch {
        expected,
        actual: buf.len(),
      });
    }

    Ok(FramedTensor {
      meta,
      payload: &buf[hsize..],
    })
  }

  /// 编码为可变格式张量缓冲区
  pub fn encode(
    element_type: ElementType,
    dims: &[u32],
    payload: &[u8],
  ) -> Result<Vec<u8>, TensorError> {
    if dims.len() > TENSOR_RANK_LIMIT {
      return Err(TensorError::RankTooLarge(dims.len()));
    }

    let mut dimension = [0u32; TENSOR_RANK_LIMIT];
    dimension[..dims.len()].copy_from_slice(dims);
    let meta = TensorMeta {
      element_type,
      dimension,
      format: FORMAT_FLEXIBLE,
      media_type: 0,
    };

    let expected = meta.data_size().unwrap_or(usize::MAX);
    if meta.rank() != dims.len() || expected != payload.len() {
      return Err(TensorError::SizeMismatch {
        expected,
        actual: payload.len(),
      });
    }

    let mut buf = vec![0u8; TENSOR_HEADER_SIZE + payload.len()];
    write_u32(&mut buf, OFFSET_MAGIC, TENSOR_META_MAGIC);
    write_u32(&mut buf, OFFSET_VERSION, TENSOR_META_VERSION);
    write_u32(&mut buf, OFFSET_TYPE, element_type as u32);
    for (i, &d) in dims.iter().enumerate() {
      write_u32(&mut buf, OFFSET_DIMENSION + 4 * i, d);
    }
    write_u32(&mut buf, OFFSET_FORMAT, meta.format);
    write_u32(&mut buf, OFFSET_MEDIA_TYPE, meta.media_type);
    buf[TENSOR_HEADER_SIZE..].copy_from_slice(payload);
    Ok(buf)
  }

  pub fn meta(&self) -> &TensorMeta {
    &self.meta
  }

  pub fn element_type(&self) -> ElementType {
    self.meta.element_type
  }

  pub fn dims(&self) -> &[u32] {
    self.meta.dims()
  }

  pub fn payload(&self) -> &'a [u8] {
    self.payload
  }
}
