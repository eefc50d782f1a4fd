//! 结果汇总
//!
//! 把调度器收集到的无序结果按 `index` 排序，计算整次运行的统计。

use tracing::info;

use crate::models::{CaseOutcome, RunSummary};

/// 排序并统计
pub fn aggregate(mut outcomes: Vec<CaseOutcome>) -> (Vec<CaseOutcome>, RunSummary) {
    outcomes.sort_by_key(|o| o.index);
    let summary = RunSummary::from_outcomes(&outcomes);
    (outcomes, summary)
}

pub fn log_report(summary: &RunSummary) {
    info!("\n{}", "─".repeat(60));
    info!("📊 分析结果统计");
    info!(
        "✅ 成功率: {:.1}% ({}/{})",
        summary.success_rate() * 100.0,
        summary.success,
        summary.total
    );
    info!("⚠️ 格式警告: {}", summary.format_warnings);
    info!("🔁 平均尝试次数: {:.1}", summary.mean_attempts);
    info!("{}", "─".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseRecord, CaseStatus};
    use crate::orchestrator::dispatcher::{DispatchConfig, Dispatcher};
    use crate::workflow::CaseProcessor;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// 第 2 个病例总是失败，其余第一次就成功
    struct SecondAlwaysFails;

    #[async_trait]
    impl CaseProcessor for SecondAlwaysFails {
        async fn process(&self, case: &CaseRecord) -> CaseOutcome {
            if case.index() == 2 {
                let log = (1..=3)
                    .map(|n| format!("Attempt {}: TransientApiError - boom", n))
                    .collect();
                CaseOutcome::failed(2, 3, log)
            } else {
                CaseOutcome::success(
                    case,
                    1,
                    "<decision>1</decision><recommendation>DES</recommendation>".to_string(),
                )
            }
        }
    }

    #[test]
    fn test_aggregate_sorts_by_index() {
        let case = |i| CaseRecord::new(i, HashMap::new());
        let outcomes = vec![
            CaseOutcome::success(&case(3), 1, "x".to_string()),
            CaseOutcome::failed(1, 2, vec!["Attempt 2: boom".to_string()]),
            CaseOutcome::success(&case(2), 1, "y".to_string()),
        ];

        let (sorted, summary) = aggregate(outcomes);
        let indices: Vec<usize> = sorted.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.success, 2);
        // 两个成功输出都没有标签
        assert_eq!(summary.format_warnings, 0);
    }

    #[tokio::test]
    async fn test_sequential_run_keeps_index_order() {
        let dispatcher = Dispatcher::new(DispatchConfig {
            concurrency: 1,
            cooldown_every: 0,
            cooldown: Duration::ZERO,
        });
        let cases = (1..=3).map(|i| CaseRecord::new(i, HashMap::new())).collect();

        let outcomes = dispatcher.run(cases, Arc::new(SecondAlwaysFails)).await;
        let (sorted, summary) = aggregate(outcomes);

        assert_eq!(sorted.len(), 3);
        assert!(matches!(sorted[0].status, CaseStatus::Success { .. }));
        assert_eq!((sorted[0].index, sorted[0].attempt_count), (1, 1));
        assert!(matches!(sorted[1].status, CaseStatus::Failed { .. }));
        assert_eq!(sorted[1].index, 2);
        assert!(sorted[2].is_success());
        assert_eq!((sorted[2].index, sorted[2].attempt_count), (3, 1));

        assert_eq!(summary.failed, 1);
        assert!((summary.mean_attempts - 5.0 / 3.0).abs() < 1e-9);
    }
}
