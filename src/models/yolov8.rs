// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、预处理 (letterbox)、推理、后处理 (解码 + NMS)

use anyhow::{bail, Result};
use image::{imageops, RgbImage};
use ndarray::{Array, ArrayView, Axis, Ix2, IxDyn};
use tracing::{debug, info, warn};

use crate::detection::{ClassNames, Detection, Detector, InferenceParams};
use crate::{non_max_suppression, OrtBackend, OrtConfig, OrtEP};

/// 输出张量前4维为 cx, cy, w, h
const CXYWH_OFFSET: usize = 4;

/// letterbox 填充值
const PAD_VALUE: f32 = 144.0 / 255.0;

/// YOLOv8 模型构建参数
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: String,
    pub ep: OrtEP,
    pub size: u32,
    pub intra_threads: usize,
    pub profile: bool,
}

/// YOLOv8 检测模型
pub struct YOLOv8 {
    engine: OrtBackend,
    names: ClassNames,
    profile: bool,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            image_size: (config.size, config.size),
            intra_threads: config.intra_threads,
        })?;

        let names = match engine.names() {
            Some(names) => names.clone(),
            None => {
                warn!("⚠️ 模型未携带类别名称,使用 COCO 80 类");
                ClassNames::coco()
            }
        };

        Ok(Self {
            engine,
            names,
            profile: config.profile,
        })
    }

    /// 推理输入尺寸 (width, height)
    fn input_size(&self, params: &InferenceParams) -> (u32, u32) {
        if self.engine.is_dynamic() {
            // YOLO 步长为 32
            let s = params.size.max(32).div_ceil(32) * 32;
            (s, s)
        } else {
            (self.engine.width(), self.engine.height())
        }
    }

    fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
        let r = (w1 / w0).min(h1 / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }

    /// 预处理: 等比缩放贴到左上角,其余填充,输出 NCHW
    pub fn preprocess(frame: &RgbImage, width: u32, height: u32) -> Array<f32, IxDyn> {
        let mut ys =
            Array::from_elem((1, 3, height as usize, width as usize), PAD_VALUE).into_dyn();

        let (w0, h0) = frame.dimensions();
        if w0 == 0 || h0 == 0 {
            return ys;
        }
        let (_, w_new, h_new) =
            Self::scale_wh(w0 as f32, h0 as f32, width as f32, height as f32);
        let resized = imageops::resize(
            frame,
            (w_new as u32).clamp(1, width),
            (h_new as u32).clamp(1, height),
            imageops::FilterType::Triangle,
        );

        for (x, y, rgb) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            ys[[0, 0, y, x]] = (r as f32) / 255.0;
            ys[[0, 1, y, x]] = (g as f32) / 255.0;
            ys[[0, 2, y, x]] = (b as f32) / 255.0;
        }

        ys
    }

    /// 后处理: [1, 4 + nc, N] 原始输出 → 原图坐标检测框
    pub fn postprocess(
        output: &Array<f32, IxDyn>,
        input_size: (u32, u32),
        original_size: (u32, u32),
        params: &InferenceParams,
    ) -> Result<Vec<Detection>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] < 1 || shape[1] <= CXYWH_OFFSET {
            bail!("YOLOv8 输出形状异常: {:?}", shape);
        }

        let preds = output
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()?;
        Ok(Self::decode(preds, input_size, original_size, params))
    }

    fn decode(
        preds: ArrayView<f32, Ix2>,
        (in_w, in_h): (u32, u32),
        (w0, h0): (u32, u32),
        params: &InferenceParams,
    ) -> Vec<Detection> {
        let (w0, h0) = (w0 as f32, h0 as f32);
        let ratio = (in_w as f32 / w0).min(in_h as f32 / h0);
        let nc = preds.shape()[0] - CXYWH_OFFSET;

        let mut data: Vec<Detection> = Vec::new();
        for pred in preds.axis_iter(Axis(1)) {
            let mut best = (0usize, f32::MIN);
            for i in 0..nc {
                let score = pred[CXYWH_OFFSET + i];
                if score > best.1 {
                    best = (i, score);
                }
            }
            let (id, confidence) = best;
            if confidence < params.conf {
                continue;
            }

            let cx = pred[0] / ratio;
            let cy = pred[1] / ratio;
            let w = pred[2] / ratio;
            let h = pred[3] / ratio;
            data.push(Detection::new(
                id as u32,
                confidence,
                (cx - w / 2.).clamp(0., w0),
                (cy - h / 2.).clamp(0., h0),
                (cx + w / 2.).clamp(0., w0),
                (cy + h / 2.).clamp(0., h0),
            ));
        }

        non_max_suppression(&mut data, params.iou);
        data
    }
}

impl Detector for YOLOv8 {
    fn predict(&mut self, frame: &RgbImage, params: &InferenceParams) -> Result<Vec<Detection>> {
        let (in_w, in_h) = self.input_size(params);

        let t_pre = std::time::Instant::now();
        let xs = Self::preprocess(frame, in_w, in_h);
        if self.profile {
            debug!("[Model Preprocess]: {:?}", t_pre.elapsed());
        }

        let t_run = std::time::Instant::now();
        let ys = self.engine.run(xs)?;
        if self.profile {
            debug!("[Model Inference]: {:?}", t_run.elapsed());
        }

        let t_post = std::time::Instant::now();
        let dets = Self::postprocess(&ys, (in_w, in_h), frame.dimensions(), params)?;
        if self.profile {
            debug!("[Model Postprocess]: {:?}", t_post.elapsed());
        }

        Ok(dets)
    }

    fn names(&self) -> &ClassNames {
        &self.names
    }

    fn summary(&self) {
        info!(
            "\nSummary:\n\
            > Task: Detect\n\
            > EP: {:?}\n\
            > Input: {}x{}{}\n\
            > Classes: {}",
            self.engine.ep(),
            self.engine.width(),
            self.engine.height(),
            if self.engine.is_dynamic() { " (dynamic)" } else { "" },
            self.names.len(),
        );
    }
}
