// 该文件是 Mianjing （面镜） 项目的一部分。
// src/input/frames_directory.rs - 帧目录输入
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

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  cropper::FrameInput,
  frame::{PixelFormat, PixelFrame},
  tensor::{ElementType, FramedTensor, TENSOR_META_MAGIC, TensorError},
  utils::url_to_path,
};

const SCORES_SUFFIX: &str = ".scores.f32";
const BOXES_SUFFIX: &str = ".boxes.f32";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum FramesDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("文件 {path} 的长度 {len} 不是 4 的倍数")]
  MalformedValues { path: String, len: usize },
  #[error("帧 {0} 缺少图像文件")]
  MissingImage(String),
  #[error("无效的像素格式: {0}")]
  InvalidFormat(String),
}

/// 从目录中按名称顺序读取帧
///
/// 每帧由同名前缀的三个文件组成：
/// `<name>.boxes.f32`、`<name>.scores.f32`（小端 f32，可带张量头）与 `<name>.png`。
pub struct FramesDirectoryInput {
  directory: PathBuf,
  stems: VecDeque<String>,
  format: PixelFormat,
}

impl FromUrlWithScheme for FramesDirectoryInput {
  const SCHEME: &'static str = "frames";
}

impl FromUrl for FramesDirectoryInput {
  type Error = FramesDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(FramesDirectoryInputError::SchemeMismatch);
    }

    let mut format = PixelFormat::default();
    for (k, v) in url.query_pairs() {
      if k == "format" {
        format = v.parse().map_err(FramesDirectoryInputError::InvalidFormat)?;
      }
    }

    Self::open(url_to_path(url), format)
  }
}

impl FramesDirectoryInput {
  pub fn open<P: AsRef<Path>>(
    directory: P,
    format: PixelFormat,
  ) -> Result<Self, FramesDirectoryInputError> {
    let directory = directory.as_ref().to_path_buf();
    let mut stems = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let name = entry?.file_name();
      if let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(SCORES_SUFFIX)) {
        stems.push(stem.to_string());
      }
    }
    stems.sort();
    info!("帧目录 {} 中共 {} 帧", directory.display(), stems.len());

    Ok(Self {
      directory,
      stems: stems.into(),
      format,
    })
  }

  pub fn remaining(&self) -> usize {
    self.stems.len()
  }

  fn load(&self, stem: &str) -> Result<FrameInput, FramesDirectoryInputError> {
    let boxes = read_f32_file(&self.directory.join(format!("{}{}", stem, BOXES_SUFFIX)))?;
    let scores = read_f32_file(&self.directory.join(format!("{}{}", stem, SCORES_SUFFIX)))?;

    let image_path = IMAGE_EXTENSIONS
      .iter()
      .map(|ext| self.directory.join(format!("{}.{}", stem, ext)))
      .find(|path| path.exists())
      .ok_or_else(|| FramesDirectoryInputError::MissingImage(stem.to_string()))?;
    let image = image::ImageReader::open(&image_path)?.decode()?;
    debug!(
      "读取帧 {}: {} 个槽位, 图像 {}x{}",
      stem,
      scores.len(),
      image.width(),
      image.height()
    );

    Ok(FrameInput {
      boxes,
      scores,
      image: PixelFrame::from_image(&image, self.format),
    })
  }
}

impl Iterator for FramesDirectoryInput {
  type Item = Result<FrameInput, FramesDirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stem = self.stems.pop_front()?;
    Some(self.load(&stem))
  }
}

/// 读取小端 f32 数组，若带张量头则要求元素类型为 float32
fn read_f32_file(path: &Path) -> Result<Vec<f32>, FramesDirectoryInputError> {
  let bytes = std::fs::read(path)?;
  let framed = bytes.len() >= 4
    && u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == TENSOR_META_MAGIC;

  let payload = if framed {
    let tensor = FramedTensor::parse(&bytes)?;
    if tensor.element_type() != ElementType::Float32 {
      return Err(TensorError::UnknownElementType(tensor.element_type() as u32).into());
    }
    tensor.payload()
  } else {
    &bytes[..]
  };

  if payload.len() % 4 != 0 {
    return Err(FramesDirectoryInputError::MalformedValues {
      path: path.display().to_string(),
      len: payload.len(),
    });
  }

  Ok(
    payload
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}
