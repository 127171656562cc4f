use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use image::imageops::FilterType;
use ndarray::Array3;

/// ImageNet 的 RGB 通道均值
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet 的 RGB 通道标准差
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 将图片转换为模型输入的预处理器
///
/// 处理流程：解码 -> 转为 RGB -> 缩放到 `size x size` -> 按 ImageNet 均值方差归一化，
/// 输出为 CHW 排列的 `f32` 数组。
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    pub size: u32,
    pub filter: FilterType,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self { size: 224, filter: FilterType::Lanczos3 }
    }
}

impl Preprocessor {
    pub fn new(size: u32, filter: FilterType) -> Self {
        Self { size, filter }
    }

    /// 从内存中解码图片
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).context("failed to decode image")
    }

    /// 从文件读取并解码图片，格式由文件内容判断
    pub fn open(&self, path: impl AsRef<Path>) -> Result<DynamicImage> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        self.decode(&bytes).with_context(|| path.display().to_string())
    }

    /// 将图片转换为 `[3, size, size]` 的归一化数组
    pub fn to_input(&self, img: &DynamicImage) -> Array3<f32> {
        let size = self.size as usize;
        let rgb = img.resize_exact(self.size, self.size, self.filter).to_rgb8();

        let mut input = Array3::zeros((3, size, size));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let v = pixel.0[c] as f32 / 255.0;
                input[[c, y, x]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
        input
    }

    pub fn process(&self, bytes: &[u8]) -> Result<Array3<f32>> {
        let img = self.decode(bytes)?;
        Ok(self.to_input(&img))
    }

    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<Array3<f32>> {
        let img = self.open(path)?;
        Ok(self.to_input(&img))
    }
}
