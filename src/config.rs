// 该文件是 Mianjing （面镜） 项目的一部分。
// src/config.rs - 人脸裁剪参数配置
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

use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  decode::DecodeParams,
  frame::PixelFormat,
  region::EmptyRegionPolicy,
  resample::CanvasSource,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("参数超出范围: {0}")]
  OutOfRange(String),
}

/// 人脸裁剪参数
///
/// 默认值对应 BlazeFace short-range 模型在 720x720 视频上的部署。
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCropConfig {
  /// 源视频帧边长（正方形）
  pub image_size: u32,
  /// 裁剪区域相对检测框的边距比例
  pub margin_rate: f32,
  /// NMS IoU 阈值
  pub iou_threshold: f32,
  /// 置信度阈值
  pub score_threshold: f32,
  pub x_scale: f32,
  pub y_scale: f32,
  pub w_scale: f32,
  pub h_scale: f32,
  /// 固定尺寸裁剪的目标宽度
  pub target_width: u32,
  /// 固定尺寸裁剪的目标高度
  pub target_height: u32,
  pub empty_policy: EmptyRegionPolicy,
  pub canvas_source: CanvasSource,
  /// 固定尺寸裁剪输出的像素格式
  pub output_format: PixelFormat,
}

impl Default for FaceCropConfig {
  fn default() -> Self {
    Self {
      image_size: 720,
      margin_rate: 0.25,
      iou_threshold: 0.3,
      score_threshold: 0.5,
      x_scale: 128.0,
      y_scale: 128.0,
      w_scale: 128.0,
      h_scale: 128.0,
      target_width: 192,
      target_height: 192,
      empty_policy: EmptyRegionPolicy::FullFrame,
      canvas_source: CanvasSource::Region,
      output_format: PixelFormat::Rgb,
    }
  }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.parse().map_err(|_| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  })
}

impl FaceCropConfig {
  pub fn decode_params(&self) -> DecodeParams {
    DecodeParams {
      image_width: self.image_size,
      image_height: self.image_size,
      x_scale: self.x_scale,
      y_scale: self.y_scale,
      w_scale: self.w_scale,
      h_scale: self.h_scale,
      score_threshold: self.score_threshold,
    }
  }

  /// 设置单个参数
  pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
      "image_size" => self.image_size = parse_value(key, value)?,
      "margin_rate" => self.margin_rate = parse_value(key, value)?,
      "iou_threshold" => self.iou_threshold = parse_value(key, value)?,
      "score_threshold" => self.score_threshold = parse_value(key, value)?,
      "x_scale" => self.x_scale = parse_value(key, value)?,
      "y_scale" => self.y_scale = parse_value(key, value)?,
      "w_scale" => self.w_scale = parse_value(key, value)?,
      "h_scale" => self.h_scale = parse_value(key, value)?,
      "scale" => {
        let scale: f32 = parse_value(key, value)?;
        self.x_scale = scale;
        self.y_scale = scale;
        self.w_scale = scale;
        self.h_scale = scale;
      }
      "target_width" => self.target_width = parse_value(key, value)?,
      "target_height" => self.target_height = parse_value(key, value)?,
      "target_size" => {
        let size: u32 = parse_value(key, value)?;
        self.target_width = size;
        self.target_height = size;
      }
      "empty" => self.empty_policy = parse_value(key, value)?,
      "canvas" => self.canvas_source = parse_value(key, value)?,
      "format" => self.output_format = parse_value(key, value)?,
      other => warn!("忽略未知参数: {}={}", other, value),
    }
    Ok(())
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.image_size == 0 || self.image_size > i32::MAX as u32 {
      return Err(ConfigError::OutOfRange(format!(
        "image_size 必须位于 [1, {}]: {}",
        i32::MAX,
        self.image_size
      )));
    }
    if !(self.margin_rate.is_finite() && self.margin_rate >= 0.0) {
      return Err(ConfigError::OutOfRange(format!(
        "margin_rate 必须为非负数: {}",
        self.margin_rate
      )));
    }
    for (name, value) in [
      ("iou_threshold", self.iou_threshold),
      ("score_threshold", self.score_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange(format!(
          "{} 必须位于 [0, 1]: {}",
          name, value
        )));
      }
    }
    for (name, value) in [
      ("x_scale", self.x_scale),
      ("y_scale", self.y_scale),
      ("w_scale", self.w_scale),
      ("h_scale", self.h_scale),
    ] {
      if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::OutOfRange(format!(
          "{} 必须为正数: {}",
          name, value
        )));
      }
    }
    if self.target_width == 0 || self.target_height == 0 {
      return Err(ConfigError::OutOfRange(format!(
        "目标尺寸无效: {}x{}",
        self.target_width, self.target_height
      )));
    }
    Ok(())
  }
}

impl FromUrlWithScheme for FaceCropConfig {
  const SCHEME: &'static str = "facecrop";
}

impl FromUrl for FaceCropConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConfigError::SchemeMismatch);
    }

    let mut config = FaceCropConfig::default();
    for (key, value) in url.query_pairs() {
      config.set(&key, &value)?;
    }
    config.validate()?;
    debug!("裁剪参数: {:?}", config);
    Ok(config)
  }
}
