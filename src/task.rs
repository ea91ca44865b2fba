// 该文件是 Mianjing （面镜） 项目的一部分。
// src/task.rs - 任务执行
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

use std::{thread, time::Duration};

use anyhow::Context;
use tracing::{error, info, warn};

use crate::{
  cropper::{FrameContext, Pipeline},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Pipeline<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始处理...");
    let mut ctx = FrameContext::new();
    let now = std::time::Instant::now();
    let result = model.process(&mut ctx, &frame)?;
    let elapsed = now.elapsed();
    info!("处理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Pipeline<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("设置 Ctrl-C 处理函数失败")?;

    let mut ctx = FrameContext::new();
    let mut frame_count = 0;
    let mut now = std::time::Instant::now();
    for frame in input {
      frame_count += 1;
      info!("处理第 {} 帧", frame_count);
      match frame {
        Ok(frame) => match model.process(&mut ctx, &frame) {
          Ok(result) => {
            let elapsed_a = now.elapsed();
            if let Err(e) = output.render_result(&frame, &result) {
              error!("第 {} 帧渲染失败: {}", frame_count, e);
            }
            let elapsed_b = now.elapsed();
            info!("处理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
          }
          Err(e) => error!("第 {} 帧处理失败, 跳过: {}", frame_count, e),
        },
        Err(e) => error!("第 {} 帧读取失败, 跳过: {}", frame_count, e),
      }
      now = std::time::Instant::now();

      if self.frame_number.is_some_and(|n| frame_count >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_count);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共 {} 帧，退出", frame_count);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("坏帧")]
  struct BadFrame;

  struct Doubler;

  impl Pipeline for Doubler {
    type Input = u32;
    type Output = u32;
    type Error = BadFrame;

    fn process(&self, ctx: &mut FrameContext, input: &u32) -> Result<u32, BadFrame> {
      ctx.next_frame();
      if *input == 0 {
        return Err(BadFrame);
      }
      Ok(input * 2)
    }
  }

  #[derive(Default)]
  struct Collect(RefCell<Vec<(u32, u32)>>);

  impl Render<u32, u32> for &Collect {
    type Error = BadFrame;

    fn render_result(&self, frame: &u32, result: &u32) -> Result<(), BadFrame> {
      self.0.borrow_mut().push((*frame, *result));
      Ok(())
    }
  }

  #[test]
  fn one_shot_processes_first_frame() {
    let sink = Collect::default();
    let input = vec![Ok::<_, BadFrame>(3u32), Ok(4)].into_iter();
    OneShotTask.run_task(input, Doubler, &sink).unwrap();
    assert_eq!(sink.0.into_inner(), vec![(3, 6)]);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let sink = Collect::default();
    let input = Vec::<Result<u32, BadFrame>>::new().into_iter();
    assert!(OneShotTask.run_task(input, Doubler, &sink).is_err());
  }

  #[test]
  fn one_shot_propagates_input_error() {
    let sink = Collect::default();
    let input = vec![Err::<u32, _>(BadFrame)].into_iter();
    assert!(OneShotTask.run_task(input, Doubler, &sink).is_err());
  }

  #[test]
  fn continuous_skips_failed_frames() {
    let sink = Collect::default();
    // 读取失败与处理失败的帧都计入帧数
    let input = vec![Ok(3u32), Err(BadFrame), Ok(0), Ok(5)].into_iter();
    ContinuousTask::default()
      .with_frame_number(Some(3))
      .run_task(input, Doubler, &sink)
      .unwrap();
    assert_eq!(sink.0.into_inner(), vec![(3, 6)]);
  }
}
