use std::collections::HashMap;

/// 单个病例（输入表中的一行）
///
/// 加载后不再修改，派发时整行移入处理它的任务。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    /// 在输入序列中的位置（从 0 开始）
    index: usize,
    /// 列名 → 单元格文本，空单元格不出现
    fields: HashMap<String, String>,
}

impl CaseRecord {
    pub fn new(index: usize, fields: HashMap<String, String>) -> Self {
        Self { index, fields }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 读取字段，空白值视为缺失
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn has_field(&self, column: &str) -> bool {
        self.field(column).is_some()
    }

    /// 性别（`SEX` 列，兼容 `GENDER`）
    pub fn gender(&self) -> Option<&str> {
        self.field("SEX").or_else(|| self.field("GENDER"))
    }

    pub fn age(&self) -> Option<&str> {
        self.field("AGE")
    }

    /// 手术日期
    pub fn date(&self) -> Option<&str> {
        self.field("DAY")
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.field("patientID")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> CaseRecord {
        CaseRecord::new(
            0,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_identity_fields() {
        let case = record(&[("SEX", "男"), ("AGE", "65"), ("DAY", "2023-05-01")]);
        assert_eq!(case.gender(), Some("男"));
        assert_eq!(case.age(), Some("65"));
        assert_eq!(case.date(), Some("2023-05-01"));
    }

    #[test]
    fn test_gender_falls_back_to_gender_column() {
        let case = record(&[("GENDER", "F")]);
        assert_eq!(case.gender(), Some("F"));
    }

    #[test]
    fn test_blank_field_is_absent() {
        let case = record(&[("CTA", "   ")]);
        assert_eq!(case.field("CTA"), None);
        assert!(!case.has_field("CTA"));
    }
}
