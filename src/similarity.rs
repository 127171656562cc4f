use anyhow::{Result, bail};
use ndarray::Array1;
use serde::Serialize;
use utoipa::ToSchema;

/// 模型输出的特征向量
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Array1<f32>);

impl FeatureVector {
    pub fn new(data: Vec<f32>) -> Self {
        Self(Array1::from(data))
    }

    /// 向量维度
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn norm(&self) -> f32 {
        self.0.dot(&self.0).sqrt()
    }

    pub fn as_array(&self) -> &Array1<f32> {
        &self.0
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

/// 计算两个特征向量的余弦相似度，结果范围为 [-1, 1]
///
/// 任意一方为零向量时相似度为 0。
pub fn cosine_similarity(a: &FeatureVector, b: &FeatureVector) -> Result<f32> {
    if a.dim() != b.dim() {
        bail!("feature dimension mismatch: {} vs {}", a.dim(), b.dim());
    }
    let (na, nb) = (a.norm(), b.norm());
    if na == 0.0 || nb == 0.0 {
        return Ok(0.0);
    }
    let sim = a.0.dot(&b.0) / (na * nb);
    if !sim.is_finite() {
        bail!("similarity is not a finite number");
    }
    // 浮点误差可能让结果略微越界
    Ok(sim.clamp(-1.0, 1.0))
}

/// 相似度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum SimilarityLevel {
    #[serde(rename = "Very High")]
    VeryHigh,
    High,
    Moderate,
    Low,
}

impl SimilarityLevel {
    /// 根据百分制分数划分等级
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::VeryHigh
        } else if score >= 60.0 {
            Self::High
        } else if score >= 40.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryHigh => "Very High",
            Self::High => "High",
            Self::Moderate => "Moderate",
            Self::Low => "Low",
        }
    }
}

/// 一次比较的结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SimilarityResult {
    /// 百分制相似度，保留两位小数
    pub similarity_score: f64,
    pub similarity_level: SimilarityLevel,
    /// 未缩放的余弦相似度
    pub raw_score: f64,
}

impl SimilarityResult {
    pub fn from_raw(raw: f32) -> Self {
        let raw = raw as f64;
        let percentage = raw * 100.0;
        Self {
            similarity_score: round2(percentage),
            similarity_level: SimilarityLevel::from_score(percentage),
            raw_score: raw,
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_cosine_identical() {
        let a = FeatureVector::new(vec![0.3, 1.2, 4.0, 0.0]);
        let sim = cosine_similarity(&a, &a.clone()).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = FeatureVector::new(vec![1.0, 0.0]);
        let b = FeatureVector::new(vec![0.0, 2.0]);
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        let b = FeatureVector::new(vec![-1.0, -2.0, -3.0]);
        assert!((cosine_similarity(&a, &b).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_scale_invariant() {
        let a = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        let b = FeatureVector::new(vec![10.0, 20.0, 30.0]);
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_dim_mismatch() {
        let a = FeatureVector::new(vec![1.0, 2.0]);
        let b = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        let err = cosine_similarity(&a, &b).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = FeatureVector::new(vec![0.0; 4]);
        let b = FeatureVector::new(vec![1.0; 4]);
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&a, &a).unwrap(), 0.0);

        let r = SimilarityResult::from_raw(cosine_similarity(&a, &b).unwrap());
        assert_eq!(r.similarity_score, 0.0);
        assert_eq!(r.similarity_level, SimilarityLevel::Low);
    }

    #[rstest]
    #[case(100.0, SimilarityLevel::VeryHigh)]
    #[case(80.0, SimilarityLevel::VeryHigh)]
    #[case(79.99, SimilarityLevel::High)]
    #[case(60.0, SimilarityLevel::High)]
    #[case(59.99, SimilarityLevel::Moderate)]
    #[case(40.0, SimilarityLevel::Moderate)]
    #[case(39.99, SimilarityLevel::Low)]
    #[case(0.0, SimilarityLevel::Low)]
    #[case(-35.0, SimilarityLevel::Low)]
    fn test_level_boundaries(#[case] score: f64, #[case] level: SimilarityLevel) {
        assert_eq!(SimilarityLevel::from_score(score), level);
    }

    #[test]
    fn test_result_from_raw() {
        let r = SimilarityResult::from_raw(0.87654);
        assert_eq!(r.similarity_score, 87.65);
        assert_eq!(r.similarity_level, SimilarityLevel::VeryHigh);
        assert!((r.raw_score - 0.87654).abs() < 1e-6);
    }

    #[test]
    fn test_level_serialize() {
        let json = serde_json::to_string(&SimilarityLevel::VeryHigh).unwrap();
        assert_eq!(json, "\"Very High\"");
        assert_eq!(SimilarityLevel::Moderate.as_str(), "Moderate");
    }
}
