// 该文件是 Mianjing （面镜） 项目的一部分。
// tests/face_crop_pipeline.rs - 端到端裁剪流程测试
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

use mianjing::{
  AnchorTable, CropRegion, DetectorOutput, EmptyRegionPolicy, FaceCropConfig, FaceCropper,
  FrameContext, FrameInput, FromUrl, PixelFormat, PixelFrame, Pipeline,
  anchor::BLAZEFACE_SHORT_RANGE_NUM_BOXES,
  decode::BLAZEFACE_NUM_COORD,
  region::CROP_INFO_SIZE,
};
use url::Url;

const SLOTS: usize = BLAZEFACE_SHORT_RANGE_NUM_BOXES;
const FACE_SLOT: usize = 5;

fn write_anchor_file(path: &Path) {
  let row = |v: &str| vec![v; SLOTS].join(" ");
  let text = format!(
    "{}\n{}\n{}\n{}\n",
    row("0.5"),
    row("0.5"),
    row("0.1"),
    row("0.1")
  );
  std::fs::write(path, text).unwrap();
}

fn detector_output(face: bool) -> (Vec<f32>, Vec<f32>) {
  let mut boxes = vec![0.0f32; SLOTS * BLAZEFACE_NUM_COORD];
  let mut scores = vec![-10.0f32; SLOTS];
  if face {
    boxes[FACE_SLOT * BLAZEFACE_NUM_COORD + 2] = 128.0;
    boxes[FACE_SLOT * BLAZEFACE_NUM_COORD + 3] = 128.0;
    scores[FACE_SLOT] = 10.0;
  }
  (boxes, scores)
}

fn load_cropper(dir: &Path) -> FaceCropper {
  let path = dir.join("box_priors.txt");
  write_anchor_file(&path);
  let url = Url::parse(&format!("anchors://{}", path.display())).unwrap();
  let anchors = AnchorTable::from_url(&url).unwrap();
  assert_eq!(anchors.len(), SLOTS);
  FaceCropper::new(anchors, FaceCropConfig::default()).unwrap()
}

#[test]
fn single_face_yields_margin_region_and_fixed_crop() {
  let dir = tempfile::tempdir().unwrap();
  let cropper = load_cropper(dir.path());

  let (boxes, scores) = detector_output(true);
  let output = DetectorOutput::new(&boxes, &scores).unwrap();
  let mut ctx = FrameContext::new();
  let (detection, region) = cropper.detect(&mut ctx, &output).unwrap();

  let detection = detection.unwrap();
  assert!(detection.valid);
  assert!(detection.probability > 0.99);
  assert_eq!(
    (detection.x, detection.y, detection.width, detection.height),
    (324, 324, 72, 72)
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

  let frame = PixelFrame::zeroed(720, 720, PixelFormat::RgbPadded);
  let config = FaceCropConfig {
    output_format: PixelFormat::RgbPadded,
    ..FaceCropConfig::default()
  };
  let cropper = FaceCropper::new(cropper.anchors().clone(), config).unwrap();
  let cropped = cropper.crop(&ctx, &frame).unwrap();
  assert_eq!((cropped.width(), cropped.height()), (192, 192));
  assert_eq!(cropped.as_ref().len(), 192 * 576);

  let info = region.to_tensor().unwrap();
  assert_eq!(CropRegion::from_tensor(&info).unwrap(), region);
  assert_eq!(region.to_ne_bytes().len(), CROP_INFO_SIZE);
}

#[test]
fn no_face_falls_back_to_full_frame() {
  let dir = tempfile::tempdir().unwrap();
  let cropper = load_cropper(dir.path());
  assert_eq!(cropper.config().empty_policy, EmptyRegionPolicy::FullFrame);

  let (boxes, scores) = detector_output(false);
  let input = FrameInput {
    boxes,
    scores,
    image: PixelFrame::zeroed(720, 720, PixelFormat::Rgb),
  };
  let mut ctx = FrameContext::new();
  let result = cropper.process(&mut ctx, &input).unwrap();

  assert!(result.detection.is_none());
  assert_eq!(result.region, CropRegion::full_frame(720));
  assert_eq!((result.cropped.width(), result.cropped.height()), (192, 192));
}

#[test]
fn duplicate_faces_collapse_to_one() {
  let dir = tempfile::tempdir().unwrap();
  let cropper = load_cropper(dir.path());

  let (mut boxes, mut scores) = detector_output(true);
  boxes[(FACE_SLOT + 1) * BLAZEFACE_NUM_COORD + 2] = 128.0;
  boxes[(FACE_SLOT + 1) * BLAZEFACE_NUM_COORD + 3] = 128.0;
  scores[FACE_SLOT + 1] = 5.0;

  let output = DetectorOutput::new(&boxes, &scores).unwrap();
  let mut ctx = FrameContext::new();
  let (detection, _) = cropper.detect(&mut ctx, &output).unwrap();
  let detection = detection.unwrap();
  assert!(detection.probability > 0.9999);
}

#[cfg(all(feature = "read_image_file", feature = "save_image_file"))]
#[test]
fn one_shot_task_reads_directory_and_saves_crop() {
  use mianjing::{
    input::InputWrapper,
    output::OutputWrapper,
    task::{OneShotTask, Task},
  };

  let dir = tempfile::tempdir().unwrap();
  let cropper = load_cropper(dir.path());

  let frames = dir.path().join("frames");
  std::fs::create_dir_all(&frames).unwrap();
  let (boxes, scores) = detector_output(true);
  let bytes = |values: &[f32]| -> Vec<u8> { values.iter().flat_map(|v| v.to_le_bytes()).collect() };
  std::fs::write(frames.join("0001.boxes.f32"), bytes(&boxes)).unwrap();
  std::fs::write(frames.join("0001.scores.f32"), bytes(&scores)).unwrap();
  image::RgbImage::from_pixel(720, 720, image::Rgb([10, 20, 30]))
    .save(frames.join("0001.png"))
    .unwrap();

  let input =
    InputWrapper::from_url(&Url::parse(&format!("frames://{}", frames.display())).unwrap())
      .unwrap();
  let target = dir.path().join("face.png");
  let output =
    OutputWrapper::from_url(&Url::parse(&format!("image://{}", target.display())).unwrap())
      .unwrap();

  OneShotTask.run_task(input, cropper, output).unwrap();

  let saved = image::open(&target).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (192, 192));
  assert_eq!(saved.get_pixel(96, 96), &image::Rgb([10, 20, 30]));
}
