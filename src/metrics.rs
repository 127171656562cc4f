use std::sync::LazyLock;

use prometheus::*;

static METRIC_COMPARE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("im_compare_count", "count of the comparison requests", &["endpoint", "status"])
        .unwrap()
});

static METRIC_COMPARE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "im_compare_duration",
        "duration of feature extraction and comparison in seconds",
        &["endpoint", "model"]
    )
    .unwrap()
});

static METRIC_COMPARE_SCORE: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "im_compare_score",
        "similarity score of the comparison",
        &["model"],
        (5..=100).step_by(5).map(|x| x as f64).collect()
    )
    .unwrap()
});

/// 记录一次请求的结果
pub fn inc_compare_count(endpoint: &str, status: &str) {
    METRIC_COMPARE_COUNT.with_label_values(&[endpoint, status]).inc();
}

pub fn observe_compare_duration(endpoint: &str, model: &str, seconds: f64) {
    METRIC_COMPARE_DURATION.with_label_values(&[endpoint, model]).observe(seconds);
}

pub fn observe_compare_score(model: &str, score: f64) {
    METRIC_COMPARE_SCORE.with_label_values(&[model]).observe(score);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&prometheus::gather())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_text() {
        inc_compare_count("test", "success");
        observe_compare_score("test-model", 42.0);
        let text = gather_text().unwrap();
        assert!(text.contains("im_compare_count"));
        assert!(text.contains("im_compare_score"));
    }
}
