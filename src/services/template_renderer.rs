//! 提示词渲染服务 - 业务能力层
//!
//! 只负责"把一行病例填进模板"，不关心 API 和流程

use crate::models::case_record::CaseRecord;
use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;

/// 内置的 PCI 决策模板
pub const DEFAULT_TEMPLATE: &str = include_str!("pci_decision_prompt.txt");

/// 主要报告字段（造影、CTA）的最大字符数
pub const PRIMARY_REPORT_MAX_CHARS: usize = 2000;
/// 次要叙述字段（超声、心电图）的最大字符数
pub const SECONDARY_NARRATIVE_MAX_CHARS: usize = 1000;

/// 占位符 → 表格列名（仅当该列存在时生效）
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("GENDER", "SEX"),
    ("ANGIOGRAPHY_RESULTS", "CAG"),
    ("CORONARY_CTA", "CTA"),
    ("CHIEF COMPLAINT", "chief complaint"),
    ("PRESENT HISTORY", "present history"),
    ("PAST HISTORY", "past history"),
];

/// 按解析后的列名截断
const TRUNCATION_LIMITS: &[(&str, usize)] = &[
    ("CAG", PRIMARY_REPORT_MAX_CHARS),
    ("CTA", PRIMARY_REPORT_MAX_CHARS),
    ("TTE", SECONDARY_NARRATIVE_MAX_CHARS),
    ("ECG", SECONDARY_NARRATIVE_MAX_CHARS),
];

/// 提示词渲染器
///
/// 职责：
/// - 解析模板中的 `{{NAME}}` 占位符
/// - 将单个病例的字段填入模板
/// - 缺失字段使用占位值，长文本截断
/// - 纯函数，不会失败
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    template: String,
    placeholders: Vec<String>,
    unknown_sentinel: String,
}

impl TemplateRenderer {
    pub fn new(
        template: impl Into<String>,
        unknown_sentinel: impl Into<String>,
    ) -> Result<Self> {
        let template = template.into();
        let placeholders = extract_placeholders(&template)?;
        Ok(Self {
            template,
            placeholders,
            unknown_sentinel: unknown_sentinel.into(),
        })
    }

    /// 使用内置模板
    pub fn with_default_template(unknown_sentinel: impl Into<String>) -> Result<Self> {
        Self::new(DEFAULT_TEMPLATE, unknown_sentinel)
    }

    /// 模板中出现的占位符（去重，按首次出现顺序）
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// 渲染单个病例
    pub fn render(&self, case: &CaseRecord) -> String {
        let mut rendered = self.template.clone();

        for placeholder in &self.placeholders {
            let column = resolve_column(placeholder, |c| case.has_field(c));
            let value = match case.field(column) {
                Some(v) => truncate_chars(v, truncation_limit(column)),
                None => self.unknown_sentinel.clone(),
            };
            rendered = rendered.replace(&format!("{{{{{}}}}}", placeholder), &value);
        }

        rendered
    }

    /// 在数据集表头中找不到对应列的占位符
    pub fn missing_columns(&self, columns: &[String]) -> Vec<String> {
        let has_column = |c: &str| columns.iter().any(|col| col == c);
        self.placeholders
            .iter()
            .filter(|p| !has_column(resolve_column(p, has_column)))
            .cloned()
            .collect()
    }
}

/// 从文件加载模板
///
/// 文件中含有 `prompt_template = '''...'''` 块时只取块内内容，否则取整个文件。
pub async fn load_template(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取模板文件: {}", path.display()))?;
    extract_template_block(&content)
}

fn extract_template_block(content: &str) -> Result<String> {
    let re = Regex::new(r"prompt_template\s*=\s*'''([\s\S]*?)'''")?;
    Ok(match re.captures(content).and_then(|c| c.get(1)) {
        Some(block) => block.as_str().trim().to_string(),
        None => content.trim().to_string(),
    })
}

fn extract_placeholders(template: &str) -> Result<Vec<String>> {
    let re = Regex::new(r"\{\{([^}]+)\}\}")?;
    let mut placeholders: Vec<String> = Vec::new();
    for cap in re.captures_iter(template) {
        let name = cap[1].to_string();
        if !placeholders.contains(&name) {
            placeholders.push(name);
        }
    }
    Ok(placeholders)
}

fn resolve_column<'a>(placeholder: &'a str, has_column: impl Fn(&str) -> bool) -> &'a str {
    COLUMN_ALIASES
        .iter()
        .find(|(name, column)| *name == placeholder && has_column(column))
        .map(|(_, column)| *column)
        .unwrap_or(placeholder)
}

fn truncation_limit(column: &str) -> Option<usize> {
    TRUNCATION_LIMITS
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, limit)| *limit)
}

fn truncate_chars(value: &str, limit: Option<usize>) -> String {
    match limit {
        Some(max) => value.chars().take(max).collect(),
        None => value.to_string(),
    }
}
