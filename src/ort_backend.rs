// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 负责: 会话创建、执行设备选择、输入尺寸与类别元数据读取

use anyhow::{anyhow, Context, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use tracing::{info, warn};

use crate::detection::ClassNames;

/// 执行设备 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

/// 后端配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: String,
    pub ep: OrtEP,
    /// 模型输入为动态尺寸时使用的 (height, width)
    pub image_size: (u32, u32),
    pub intra_threads: usize,
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    output_name: String,
    height: u32,
    width: u32,
    dynamic: bool,
    names: Option<ClassNames>,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads.max(1))?;

        builder = match config.ep {
            OrtEP::CPU => builder,
            OrtEP::CUDA(device_id) => builder.with_execution_providers([
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])?,
            OrtEP::Trt(device_id) => builder.with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])?,
        };

        let session = builder
            .commit_from_file(&config.f)
            .with_context(|| format!("加载模型失败: {}", config.f))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("模型没有输入"))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| anyhow!("模型没有输出"))?;
        let output_name = output.name.clone();

        // NCHW, 动态维度为 -1
        let (mut height, mut width) = config.image_size;
        let mut dynamic = true;
        if let ValueType::Tensor { dimensions, .. } = &input.input_type {
            if dimensions.len() == 4 && dimensions[2] > 0 && dimensions[3] > 0 {
                height = dimensions[2] as u32;
                width = dimensions[3] as u32;
                dynamic = false;
            }
        }

        let names = match session.metadata() {
            Ok(meta) => match meta.custom("names") {
                Ok(Some(raw)) => ClassNames::parse_metadata(&raw),
                Ok(None) => None,
                Err(e) => {
                    warn!("⚠️ 读取类别元数据失败: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("⚠️ 读取模型元数据失败: {}", e);
                None
            }
        };

        info!(
            "✅ ONNX 会话就绪: {} ({:?}, 输入 {}x{}{})",
            config.f,
            config.ep,
            width,
            height,
            if dynamic { ", 动态" } else { "" }
        );

        Ok(Self {
            session,
            ep: config.ep,
            output_name,
            height,
            width,
            dynamic,
            names,
        })
    }

    /// 单输入单输出推理
    pub fn run(&self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        let input = Tensor::from_array(xs)?;
        let outputs = self.session.run(ort::inputs![input]?)?;
        let ys = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()?
            .into_owned();
        Ok(ys)
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// 输入尺寸是否可变 (可按推理参数调整)
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    /// 模型元数据中的类别表 (导出时未写入则为 None)
    pub fn names(&self) -> Option<&ClassNames> {
        self.names.as_ref()
    }
}
