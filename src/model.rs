use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use candle::{DType, Device, Module, Tensor};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;
use clap::ValueEnum;
use hf_hub::api::sync::ApiBuilder;
use log::{debug, info};
use ndarray::Array3;

use crate::similarity::FeatureVector;

/// 预训练权重所在的 HuggingFace 仓库
pub const WEIGHTS_REPO: &str = "lmz/candle-resnet";

/// 特征提取器
///
/// 输入为预处理后的 CHW 图片数组，每张图片输出一个固定维度的特征向量。
pub trait FeatureExtractor: Send + Sync {
    /// 模型名称，仅用于日志
    fn name(&self) -> &str;

    /// 输出特征向量的维度
    fn dim(&self) -> usize;

    /// 批量提取特征，输出顺序与输入一致
    fn extract(&self, inputs: &[Array3<f32>]) -> Result<Vec<FeatureVector>>;
}

/// 可选的骨干网络
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Resnet18,
    Resnet34,
    Resnet50,
    Resnet101,
    Resnet152,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resnet18 => "resnet18",
            Self::Resnet34 => "resnet34",
            Self::Resnet50 => "resnet50",
            Self::Resnet101 => "resnet101",
            Self::Resnet152 => "resnet152",
        }
    }

    /// 权重文件名
    pub fn weights_file(&self) -> String {
        format!("{}.safetensors", self.name())
    }

    /// 去掉分类层、全局平均池化之后的输出维度
    pub fn feature_dim(&self) -> usize {
        match self {
            Self::Resnet18 | Self::Resnet34 => 512,
            Self::Resnet50 | Self::Resnet101 | Self::Resnet152 => 2048,
        }
    }
}

/// 去掉分类层的 ResNet
pub struct ResNet {
    kind: ModelKind,
    model: Func<'static>,
    device: Device,
}

impl ResNet {
    /// 从 safetensors 文件加载模型
    pub fn load(kind: ModelKind, weights: &Path, device: Device) -> Result<Self> {
        info!("正在加载 {} 模型: {}", kind.name(), weights.display());
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = Self::from_var_builder(kind, vb, device)?;
        info!("模型加载完成");
        Ok(model)
    }

    pub fn from_var_builder(kind: ModelKind, vb: VarBuilder<'static>, device: Device) -> Result<Self> {
        let model = match kind {
            ModelKind::Resnet18 => resnet::resnet18_no_final_layer(vb)?,
            ModelKind::Resnet34 => resnet::resnet34_no_final_layer(vb)?,
            ModelKind::Resnet50 => resnet::resnet50_no_final_layer(vb)?,
            ModelKind::Resnet101 => resnet::resnet101_no_final_layer(vb)?,
            ModelKind::Resnet152 => resnet::resnet152_no_final_layer(vb)?,
        };
        Ok(Self { kind, model, device })
    }

    fn to_tensor(&self, input: &Array3<f32>) -> candle::Result<Tensor> {
        let (c, h, w) = input.dim();
        let data = input.iter().copied().collect::<Vec<_>>();
        Tensor::from_vec(data, (c, h, w), &self.device)
    }
}

impl FeatureExtractor for ResNet {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn dim(&self) -> usize {
        self.kind.feature_dim()
    }

    fn extract(&self, inputs: &[Array3<f32>]) -> Result<Vec<FeatureVector>> {
        if inputs.is_empty() {
            return Ok(vec![]);
        }

        let tensors = inputs.iter().map(|x| self.to_tensor(x)).collect::<candle::Result<Vec<_>>>()?;
        let batch = Tensor::stack(&tensors, 0)?;
        debug!("推理输入: {:?}", batch.shape());

        let output = self.model.forward(&batch)?;
        let rows = output.to_dtype(DType::F32)?.to_vec2::<f32>()?;

        if rows.len() != inputs.len() {
            bail!("model returned {} vectors for {} images", rows.len(), inputs.len());
        }
        for row in &rows {
            if row.len() != self.dim() {
                bail!("model output has dimension {}, expected {}", row.len(), self.dim());
            }
        }
        Ok(rows.into_iter().map(FeatureVector::from).collect())
    }
}

/// 选择推理设备，未启用 cuda feature 时总是 CPU
pub fn select_device(cuda: bool) -> Result<Device> {
    if cuda { Ok(Device::cuda_if_available(0)?) } else { Ok(Device::Cpu) }
}

/// 获取权重文件路径
///
/// 优先使用本地指定的文件，否则从 HuggingFace 下载到 `model_dir` 缓存目录。
pub fn resolve_weights(kind: ModelKind, model_dir: &Path, weights: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = weights {
        if !path.is_file() {
            bail!("weights file not found: {}", path.display());
        }
        return Ok(path.to_path_buf());
    }

    let api = ApiBuilder::new().with_cache_dir(model_dir.to_path_buf()).build()?;
    let file = kind.weights_file();
    info!("正在获取权重 {}/{}", WEIGHTS_REPO, file);
    let path = api.model(WEIGHTS_REPO.to_string()).get(&file)?;
    Ok(path)
}
