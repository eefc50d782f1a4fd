use crate::models::case_outcome::CaseOutcome;
use crate::workflow::format_check::FORMAT_WARNING_MARKER;

/// 整次运行的统计汇总，收集完全部结果后计算一次
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// 输出中带格式警告的成功病例数
    pub format_warnings: usize,
    /// 平均尝试次数（成功与失败都计入）
    pub mean_attempts: f64,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[CaseOutcome]) -> Self {
        let total = outcomes.len();
        let success = outcomes.iter().filter(|o| o.is_success()).count();
        let format_warnings = outcomes
            .iter()
            .filter_map(CaseOutcome::model_output)
            .filter(|output| output.contains(FORMAT_WARNING_MARKER))
            .count();
        let mean_attempts = if total == 0 {
            0.0
        } else {
            outcomes.iter().map(|o| o.attempt_count as f64).sum::<f64>() / total as f64
        };

        Self {
            total,
            success,
            failed: total - success,
            format_warnings,
            mean_attempts,
        }
    }

    /// 成功率（0.0 ~ 1.0），空输入为 0
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::case_record::CaseRecord;
    use std::collections::HashMap;

    #[test]
    fn test_summary_counts() {
        let case = CaseRecord::new(0, HashMap::new());
        let outcomes = vec![
            CaseOutcome::success(&case, 1, "ok".to_string()),
            CaseOutcome::success(
                &case,
                2,
                "text(Format Warning: Unclosed Tags)".to_string(),
            ),
            CaseOutcome::failed(2, 3, vec!["Attempt 3: boom".to_string()]),
        ];

        let summary = RunSummary::from_outcomes(&outcomes);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.format_warnings, 1);
        assert!((summary.mean_attempts - 2.0).abs() < f64::EPSILON);
        assert!((summary.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        let summary = RunSummary::from_outcomes(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate(), 0.0);
        assert_eq!(summary.mean_attempts, 0.0);
    }
}
