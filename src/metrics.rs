use std::sync::LazyLock;

use prometheus::*;

static METRIC_QUERY_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("imtag_query_count", "count of the executed queries", &["status"])
        .unwrap()
});

static METRIC_QUERY_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imtag_query_duration",
        "duration of the per-query compile and evaluation in seconds",
        exponential_buckets(0.0001, 4., 10).unwrap()
    )
    .unwrap()
});

static METRIC_QUERY_RESULTS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imtag_query_results",
        "number of images returned by the per-query evaluation",
        exponential_buckets(1., 4., 10).unwrap()
    )
    .unwrap()
});

/// 增加查询计数，status 为 ok、error 或 cancelled
pub fn inc_query_count(status: &str) {
    METRIC_QUERY_COUNT.with_label_values(&[status]).inc();
}

pub fn observe_query_duration(duration: f32) {
    METRIC_QUERY_DURATION.observe(duration as f64);
}

pub fn observe_result_count(count: usize) {
    METRIC_QUERY_RESULTS.observe(count as f64);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&gather())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather() {
        inc_query_count("ok");
        observe_query_duration(0.01);
        observe_result_count(3);
        let text = gather_text().unwrap();
        assert!(text.contains("imtag_query_count"));
        assert!(text.contains("imtag_query_duration"));
    }
}
