use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use log::{info, warn};
use ndarray::Array3;
use rayon::prelude::*;
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio::task::spawn_blocking;
use utoipa::ToSchema;

use crate::config::EngineOptions;
use crate::model::{self, FeatureExtractor, ResNet};
use crate::preprocess::Preprocessor;
use crate::similarity::{FeatureVector, SimilarityResult, cosine_similarity};

/// 批量比较时每次送入模型的图片数量
const BATCH_SIZE: usize = 16;

/// 批量比较中单张图片的结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchEntry {
    pub image: String,
    /// 百分制相似度，出错时为 0
    pub similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchEntry {
    fn failed(image: String, err: &anyhow::Error) -> Self {
        Self { image, similarity: 0.0, error: Some(format!("{err:#}")) }
    }
}

/// 图片相似度计算引擎
pub struct SimilarityEngine {
    extractor: Box<dyn FeatureExtractor>,
    preprocessor: Preprocessor,
}

impl SimilarityEngine {
    pub fn new(extractor: Box<dyn FeatureExtractor>, preprocessor: Preprocessor) -> Self {
        Self { extractor, preprocessor }
    }

    /// 根据配置加载预训练模型
    ///
    /// # Arguments
    ///
    /// * `opts` - 模型相关选项
    /// * `model_dir` - 权重缓存目录
    pub fn load(opts: &EngineOptions, model_dir: &Path) -> Result<Self> {
        let weights = model::resolve_weights(opts.model, model_dir, opts.weights.as_deref())?;
        let device = model::select_device(opts.cuda)?;
        let resnet = ResNet::load(opts.model, &weights, device)?;
        Ok(Self::new(Box::new(resnet), opts.preprocessor()))
    }

    pub fn model_name(&self) -> &str {
        self.extractor.name()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// 提取一批预处理后图片的特征，并检查维度
    pub fn extract_inputs(&self, inputs: &[Array3<f32>]) -> Result<Vec<FeatureVector>> {
        let features = self.extractor.extract(inputs)?;
        if features.len() != inputs.len() {
            bail!("extractor returned {} vectors for {} images", features.len(), inputs.len());
        }
        if let Some(f) = features.iter().find(|f| f.dim() != self.extractor.dim()) {
            bail!("feature dimension {} does not match model output size {}", f.dim(), self.extractor.dim());
        }
        Ok(features)
    }

    /// 提取单张图片的特征
    pub fn extract_features(&self, bytes: &[u8]) -> Result<FeatureVector> {
        let input = self.preprocessor.process(bytes)?;
        let mut features = self.extract_inputs(&[input])?;
        Ok(features.remove(0))
    }

    /// 计算两张图片的相似度
    pub fn compare(&self, image1: &[u8], image2: &[u8]) -> Result<SimilarityResult> {
        let inputs = [image1, image2]
            .par_iter()
            .map(|bytes| self.preprocessor.process(bytes))
            .collect::<Result<Vec<_>>>()?;

        let features = self.extract_inputs(&inputs)?;
        let raw = cosine_similarity(&features[0], &features[1])?;
        let result = SimilarityResult::from_raw(raw);

        info!("相似度: {:.2}% ({})", result.similarity_score, result.similarity_level.as_str());
        Ok(result)
    }

    /// 计算两个图片文件的相似度
    pub fn compare_files(&self, path1: impl AsRef<Path>, path2: impl AsRef<Path>) -> Result<SimilarityResult> {
        let image1 = std::fs::read(path1)?;
        let image2 = std::fs::read(path2)?;
        self.compare(&image1, &image2)
    }

    /// 计算候选图片与参考特征的相似度
    ///
    /// 单张图片处理失败不影响其他图片，失败的图片相似度记为 0。结果保持输入顺序。
    pub fn score_candidates(
        &self,
        reference: &FeatureVector,
        candidates: Vec<(String, Result<Array3<f32>>)>,
    ) -> Vec<BatchEntry> {
        let mut slots = vec![None; candidates.len()];
        let mut pending = Vec::with_capacity(BATCH_SIZE);

        for (i, (image, input)) in candidates.into_iter().enumerate() {
            match input {
                Ok(input) => pending.push((i, image, input)),
                Err(e) => {
                    warn!("{image}: {e:#}");
                    slots[i] = Some(BatchEntry::failed(image, &e));
                }
            }
            if pending.len() == BATCH_SIZE {
                self.score_chunk(reference, std::mem::take(&mut pending), &mut slots);
            }
        }
        if !pending.is_empty() {
            self.score_chunk(reference, pending, &mut slots);
        }

        slots.into_iter().flatten().collect()
    }

    fn score_chunk(
        &self,
        reference: &FeatureVector,
        chunk: Vec<(usize, String, Array3<f32>)>,
        slots: &mut [Option<BatchEntry>],
    ) {
        let mut inputs = Vec::with_capacity(chunk.len());
        let mut names = Vec::with_capacity(chunk.len());
        for (i, image, input) in chunk {
            names.push((i, image));
            inputs.push(input);
        }

        let features = match self.extract_inputs(&inputs) {
            Ok(features) => features,
            Err(e) => {
                warn!("批量提取特征失败: {e:#}");
                for (i, image) in names {
                    slots[i] = Some(BatchEntry::failed(image, &e));
                }
                return;
            }
        };

        for ((i, image), feature) in names.into_iter().zip(features) {
            slots[i] = Some(match cosine_similarity(reference, &feature) {
                Ok(sim) => {
                    BatchEntry { image, similarity: SimilarityResult::from_raw(sim).similarity_score, error: None }
                }
                Err(e) => BatchEntry::failed(image, &e),
            });
        }
    }

    /// 将一张参考图片与多张图片比较，结果按相似度从高到低排序
    ///
    /// 参考图片处理失败时直接返回错误。
    pub fn batch_compare(&self, reference: &[u8], candidates: &[(String, Vec<u8>)]) -> Result<Vec<BatchEntry>> {
        let reference = self.extract_features(reference)?;

        let inputs = candidates
            .par_iter()
            .map(|(name, bytes)| (name.clone(), self.preprocessor.process(bytes)))
            .collect::<Vec<_>>();

        let mut entries = self.score_candidates(&reference, inputs);
        sort_entries(&mut entries);
        Ok(entries)
    }
}

/// 按相似度从高到低排序
pub fn sort_entries(entries: &mut [BatchEntry]) {
    entries.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
}

fn already_loaded() -> Result<SimilarityEngine> {
    bail!("engine is already loaded")
}

type EngineLoader = Arc<dyn Fn() -> Result<SimilarityEngine> + Send + Sync>;

/// 进程内共享的引擎，第一次使用时才加载模型
///
/// 加载失败不会被缓存，下一次调用会重新尝试。
pub struct SharedEngine {
    cell: OnceCell<Arc<SimilarityEngine>>,
    loader: EngineLoader,
}

impl SharedEngine {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<SimilarityEngine> + Send + Sync + 'static,
    {
        Self { cell: OnceCell::new(), loader: Arc::new(loader) }
    }

    /// 使用已经加载好的引擎
    pub fn ready(engine: SimilarityEngine) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(engine))),
            loader: Arc::new(already_loaded),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// 获取引擎，必要时在阻塞线程池中加载模型
    pub async fn get(&self) -> Result<Arc<SimilarityEngine>> {
        self.cell
            .get_or_try_init(|| async {
                let loader = self.loader.clone();
                let engine = spawn_blocking(move || loader()).await??;
                Ok::<_, anyhow::Error>(Arc::new(engine))
            })
            .await
            .cloned()
    }
}
