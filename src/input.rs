// 该文件是 Mianjing （面镜） 项目的一部分。
// src/input.rs - 检测器输出与视频帧输入
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, cropper::FrameInput};

mod frames_directory;
pub use self::frames_directory::{FramesDirectoryInput, FramesDirectoryInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("帧目录输入错误: {0}")]
  FramesDirectoryInputError(#[from] FramesDirectoryInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  FramesDirectory(FramesDirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      FramesDirectoryInput::SCHEME => {
        let input = FramesDirectoryInput::from_url(url)?;
        Ok(InputWrapper::FramesDirectory(input))
      }
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<FrameInput, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::FramesDirectory(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}
