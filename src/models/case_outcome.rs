use crate::models::case_record::CaseRecord;

/// 单个病例的处理结果
///
/// 成功时只有模型输出，失败时只有错误日志，由 [`CaseStatus`] 保证二者互斥。
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    /// 对应 [`CaseRecord::index`]
    pub index: usize,
    /// 已消耗的外层尝试次数（>= 1）
    pub attempt_count: u32,
    pub status: CaseStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseStatus {
    Success {
        model_output: String,
        gender: Option<String>,
        age: Option<String>,
        date: Option<String>,
    },
    Failed {
        /// 每次尝试的错误描述，按时间顺序
        error_log: Vec<String>,
    },
}

impl CaseOutcome {
    /// 成功结果，回显病例的身份字段
    pub fn success(case: &CaseRecord, attempt_count: u32, model_output: String) -> Self {
        Self {
            index: case.index(),
            attempt_count: attempt_count.max(1),
            status: CaseStatus::Success {
                model_output,
                gender: case.gender().map(str::to_string),
                age: case.age().map(str::to_string),
                date: case.date().map(str::to_string),
            },
        }
    }

    /// 失败结果；错误日志为空时补一条 "Unknown Error"
    pub fn failed(index: usize, attempt_count: u32, mut error_log: Vec<String>) -> Self {
        if error_log.is_empty() {
            error_log.push("Unknown Error".to_string());
        }
        Self {
            index,
            attempt_count: attempt_count.max(1),
            status: CaseStatus::Failed { error_log },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, CaseStatus::Success { .. })
    }

    pub fn status_label(&self) -> &'static str {
        match self.status {
            CaseStatus::Success { .. } => "success",
            CaseStatus::Failed { .. } => "failed",
        }
    }

    pub fn model_output(&self) -> Option<&str> {
        match &self.status {
            CaseStatus::Success { model_output, .. } => Some(model_output),
            CaseStatus::Failed { .. } => None,
        }
    }

    pub fn error_log(&self) -> Option<&[String]> {
        match &self.status {
            CaseStatus::Success { .. } => None,
            CaseStatus::Failed { error_log } => Some(error_log),
        }
    }

    /// 失败摘要：错误日志的最后一条
    pub fn last_error(&self) -> Option<&str> {
        self.error_log()
            .and_then(|log| log.last())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_success_echoes_identity() {
        let mut fields = HashMap::new();
        fields.insert("SEX".to_string(), "女".to_string());
        fields.insert("AGE".to_string(), "58".to_string());
        let case = CaseRecord::new(7, fields);

        let outcome = CaseOutcome::success(&case, 2, "<decision>1</decision>".to_string());
        assert!(outcome.is_success());
        assert_eq!(outcome.index, 7);
        assert_eq!(outcome.attempt_count, 2);
        assert!(outcome.error_log().is_none());
        match &outcome.status {
            CaseStatus::Success {
                gender, age, date, ..
            } => {
                assert_eq!(gender.as_deref(), Some("女"));
                assert_eq!(age.as_deref(), Some("58"));
                assert_eq!(date, &None);
            }
            CaseStatus::Failed { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn test_failed_keeps_full_log_and_summary() {
        let outcome = CaseOutcome::failed(
            3,
            2,
            vec!["Attempt 1: a".to_string(), "Attempt 2: b".to_string()],
        );
        assert!(!outcome.is_success());
        assert!(outcome.model_output().is_none());
        assert_eq!(outcome.error_log().map(<[String]>::len), Some(2));
        assert_eq!(outcome.last_error(), Some("Attempt 2: b"));
        assert_eq!(outcome.status_label(), "failed");
    }

    #[test]
    fn test_failed_with_empty_log() {
        let outcome = CaseOutcome::failed(0, 0, Vec::new());
        assert_eq!(outcome.attempt_count, 1);
        assert_eq!(outcome.last_error(), Some("Unknown Error"));
    }
}
