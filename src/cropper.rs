// 该文件是 Mianjing （面镜） 项目的一部分。
// src/cropper.rs - 人脸检测后处理与裁剪流水线
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
use tracing::{debug, info};

use crate::{
  anchor::AnchorTable,
  config::{ConfigError, FaceCropConfig},
  decode::{DecodeError, DecodeParams, Detection, DetectorOutput, decode_all},
  frame::PixelFrame,
  region::{CropRegion, synthesize},
  resample::{ResampleError, crop_into_canvas, crop_to_size},
  select::select,
};

/// 帧处理流水线
pub trait Pipeline {
  type Input;
  type Output;
  type Error;

  fn process(&self, ctx: &mut FrameContext, input: &Self::Input)
  -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum CropError {
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("重采样错误: {0}")]
  Resample(#[from] ResampleError),
}

/// 单路视频流的处理状态
///
/// 检测阶段写入最新的裁剪区域，裁剪阶段读取它。
/// 每路流各自持有一个，互不共享。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameContext {
  pub frame_index: u64,
  pub last_region: Option<CropRegion>,
}

impl FrameContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn next_frame(&mut self) {
    self.frame_index = self.frame_index.wrapping_add(1);
  }
}

/// 单帧输入：检测器原始输出与对应的视频帧
#[derive(Debug, Clone)]
pub struct FrameInput {
  pub boxes: Vec<f32>,
  pub scores: Vec<f32>,
  pub image: PixelFrame,
}

#[derive(Debug, Clone)]
pub struct CropResult {
  pub frame_index: u64,
  pub detection: Option<Detection>,
  pub region: CropRegion,
  pub cropped: PixelFrame,
}

pub struct FaceCropper {
  anchors: AnchorTable,
  config: FaceCropConfig,
  params: DecodeParams,
}

impl FaceCropper {
  pub fn new(anchors: AnchorTable, config: FaceCropConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    info!(
      "人脸裁剪器: {} 个先验框, 目标尺寸 {}x{}",
      anchors.len(),
      config.target_width,
      config.target_height
    );
    let params = config.decode_params();
    Ok(Self {
      anchors,
      config,
      params,
    })
  }

  pub fn config(&self) -> &FaceCropConfig {
    &self.config
  }

  pub fn anchors(&self) -> &AnchorTable {
    &self.anchors
  }

  /// 解码、筛选并生成裁剪区域，结果写入 `ctx`
  pub fn detect(
    &self,
    ctx: &mut FrameContext,
    output: &DetectorOutput<'_>,
  ) -> Result<(Option<Detection>, CropRegion), DecodeError> {
    let detections = decode_all(output, &self.anchors, &self.params)?;
    let best = select(&detections, self.config.iou_threshold);
    let region = synthesize(
      best.as_ref(),
      self.config.margin_rate,
      self.config.image_size,
      self.config.empty_policy,
    );
    debug!("第 {} 帧: 检测 {:?}, 区域 {:?}", ctx.frame_index, best, region);
    ctx.last_region = Some(region);
    Ok((best, region))
  }

  /// 当前应使用的裁剪区域，尚未检测时使用回退区域
  pub fn region(&self, ctx: &FrameContext) -> CropRegion {
    ctx.last_region.unwrap_or_else(|| {
      CropRegion::fallback(self.config.empty_policy, self.config.image_size)
    })
  }

  /// 固定尺寸裁剪
  pub fn crop(&self, ctx: &FrameContext, frame: &PixelFrame) -> Result<PixelFrame, ResampleError> {
    crop_to_size(
      frame,
      &self.region(ctx),
      self.config.target_width,
      self.config.target_height,
      self.config.output_format,
    )
  }

  fn process_frame(&self, ctx: &mut FrameContext, input: &FrameInput) -> Result<CropResult, CropError> {
    let output = DetectorOutput::new(&input.boxes, &input.scores)?;
    let (detection, region) = self.detect(ctx, &output)?;
    let cropped = self.crop(ctx, &input.image)?;
    Ok(CropResult {
      frame_index: ctx.frame_index,
      detection,
      region,
      cropped,
    })
  }

  /// 与源帧同尺寸的画布，仅裁剪区域内有像素
  pub fn overlay(
    &self,
    ctx: &FrameContext,
    frame: &PixelFrame,
  ) -> Result<PixelFrame, ResampleError> {
    crop_into_canvas(frame, &self.region(ctx), self.config.canvas_source)
  }
}

impl Pipeline for FaceCropper {
  type Input = FrameInput;
  type Output = CropResult;
  type Error = CropError;

  fn process(&self, ctx: &mut FrameContext, input: &FrameInput) -> Result<CropResult, CropError> {
    // 失败的帧同样占用一个帧序号
    let result = self.process_frame(ctx, input);
    ctx.next_frame();
    result
  }
}
