// 该文件是 Mianjing （面镜） 项目的一部分。
// src/anchor.rs - 先验框（锚框）表
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

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, utils::url_to_path};

/// BlazeFace short-range 模型的输出槽位数量
pub const BLAZEFACE_SHORT_RANGE_NUM_BOXES: usize = 896;

/// 先验框表的最大容量
pub const ANCHOR_CAPACITY: usize = BLAZEFACE_SHORT_RANGE_NUM_BOXES;

/// 每个先验框的字段数量：center_x, center_y, width, height
const ANCHOR_FIELDS: usize = 4;

const ANCHOR_SEPARATORS: &[char] = &[' ', '\t', ',', '\r'];

/// 单个先验框，坐标为归一化的图像相对单位
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Anchor {
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
}

impl Anchor {
  fn set_field(&mut self, field: usize, value: f32) {
    match field {
      0 => self.center_x = value,
      1 => self.center_y = value,
      2 => self.width = value,
      _ => self.height = value,
    }
  }
}

#[derive(Error, Debug)]
pub enum AnchorError {
  #[error("先验框文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("先验框数据格式错误: {0}")]
  MalformedAnchors(String),
  #[error("先验框数据不一致: 第 {row} 行有 {found} 个值, 期望 {expected} 个")]
  InconsistentAnchors {
    row: usize,
    expected: usize,
    found: usize,
  },
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 先验框表，行顺序与检测器输出槽位顺序一致
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTable {
  anchors: Box<[Anchor]>,
}

impl AnchorTable {
  /// 从文本解析先验框表
  ///
  /// 文本按列存储：前 4 个非空行依次为 center_x、center_y、width、height，
  /// 每行以空格、制表符或逗号分隔 N 个数值，N 即槽位数量。
  pub fn parse(text: &str) -> Result<Self, AnchorError> {
    let rows: Vec<&str> = text
      .split('\n')
      .filter(|line| !line.trim().is_empty())
      .take(ANCHOR_FIELDS)
      .collect();

    if rows.len() < ANCHOR_FIELDS {
      error!(
        "先验框文件至少需要 {} 行数据, 实际为 {} 行",
        ANCHOR_FIELDS,
        rows.len()
      );
      return Err(AnchorError::MalformedAnchors(format!(
        "至少需要 {} 行数据, 实际为 {} 行",
        ANCHOR_FIELDS,
        rows.len()
      )));
    }

    let mut anchors = vec![Anchor::default(); ANCHOR_CAPACITY];
    let mut expected: Option<usize> = None;

    for (row, line) in rows.iter().enumerate() {
      let mut registered = 0usize;
      let mut dropped = 0usize;

      for word in line.split(ANCHOR_SEPARATORS) {
        let Ok(value) = word.parse::<f32>() else {
          continue;
        };
        if !value.is_finite() {
          continue;
        }
        if registered >= ANCHOR_CAPACITY {
          dropped += 1;
          continue;
        }
        anchors[registered].set_field(row, value);
        registered += 1;
      }

      if dropped > 0 {
        warn!(
          "先验框文件第 {} 行数据过多, 已丢弃 {} 个超出容量 {} 的值",
          row, dropped, ANCHOR_CAPACITY
        );
      }

      match expected {
        Some(expected) if expected != registered => {
          error!("先验框文件数据不一致");
          return Err(AnchorError::InconsistentAnchors {
            row,
            expected,
            found: registered,
          });
        }
        _ => expected = Some(registered),
      }
    }

    let count = expected.unwrap_or(0);
    if count == 0 {
      return Err(AnchorError::MalformedAnchors("没有可用的数值".to_string()));
    }

    anchors.truncate(count);
    debug!("已加载 {} 个先验框", count);

    Ok(AnchorTable {
      anchors: anchors.into_boxed_slice(),
    })
  }

  /// 从文件加载先验框表
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AnchorError> {
    let path = path.as_ref();
    info!("加载先验框文件: {}", path.display());
    let contents = std::fs::read_to_string(path).inspect_err(|e| {
      error!("先验框文件 {} 无法读取: {}", path.display(), e);
    })?;
    Self::parse(&contents)
  }

  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Anchor> {
    self.anchors.get(index)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Anchor> {
    self.anchors.iter()
  }
}

impl AsRef<[Anchor]> for AnchorTable {
  fn as_ref(&self) -> &[Anchor] {
    &self.anchors
  }
}

impl FromUrlWithScheme for AnchorTable {
  const SCHEME: &'static str = "anchors";
}

impl FromUrl for AnchorTable {
  type Error = AnchorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(AnchorError::SchemeMismatch);
    }

    Self::load(url_to_path(url))
  }
}
