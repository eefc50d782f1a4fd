//! 结果写入服务 - 业务能力层
//!
//! 只负责"把表格落盘"：优先写 .xlsx，失败时回退为同名 .csv

use crate::error::AppError;
use crate::models::case_outcome::{CaseOutcome, CaseStatus};
use anyhow::{Context, Result};
use rust_xlsxwriter::Workbook;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Excel 单元格允许的最大字符数
const XLSX_MAX_CELL_CHARS: usize = 32_767;

/// 分析结果表的列
pub const OUTCOME_COLUMNS: [&str; 8] = [
    "index",
    "status",
    "attempt_count",
    "gender",
    "age",
    "surgery_date",
    "model_output",
    "error_log",
];

/// 提示词表的列（仅生成提示词模式）
pub const PROMPT_COLUMNS: [&str; 6] = ["index", "patient_id", "gender", "age", "surgery_date", "prompt"];

/// 单元格
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn as_text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<Option<&str>> for Cell {
    fn from(value: Option<&str>) -> Self {
        Cell::Text(value.unwrap_or_default().to_string())
    }
}

/// 实际写入的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// 主格式（.xlsx）
    Primary(PathBuf),
    /// 回退格式（.csv）
    Fallback(PathBuf),
}

impl WriteTarget {
    pub fn path(&self) -> &Path {
        match self {
            WriteTarget::Primary(p) | WriteTarget::Fallback(p) => p,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, WriteTarget::Fallback(_))
    }
}

/// 结果写入服务
///
/// 职责：
/// - 写主格式表格
/// - 主格式失败时记录原因并写 .csv 备份
/// - 两者都失败才返回错误
pub struct ResultWriter {
    output_path: PathBuf,
}

impl ResultWriter {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    /// 备份文件路径：同目录、同名、扩展名为 .csv
    pub fn fallback_path(&self) -> PathBuf {
        self.output_path.with_extension("csv")
    }

    /// 写入按 index 排好序的分析结果
    pub fn write_outcomes(&self, outcomes: &[CaseOutcome]) -> Result<WriteTarget> {
        let rows: Vec<Vec<Cell>> = outcomes.iter().map(outcome_row).collect();
        self.write_table(&OUTCOME_COLUMNS, &rows)
    }

    /// 写入任意表格
    pub fn write_table(&self, headers: &[&str], rows: &[Vec<Cell>]) -> Result<WriteTarget> {
        ensure_parent_dir(&self.output_path)?;
        info!("正在保存到: {}", self.output_path.display());

        match write_xlsx(&self.output_path, headers, rows) {
            Ok(()) => {
                log_saved(&self.output_path);
                Ok(WriteTarget::Primary(self.output_path.clone()))
            }
            Err(e) => {
                if is_permission_denied(&e) {
                    error!("没有写入权限: {}", e);
                    info!("请关闭已打开的结果文件后重试");
                } else {
                    error!("保存失败: {}", e);
                }

                let csv_path = self.fallback_path();
                write_csv(&csv_path, headers, rows)?;
                warn!("已生成 CSV 备份文件: {}", csv_path.display());
                Ok(WriteTarget::Fallback(csv_path))
            }
        }
    }
}

fn outcome_row(outcome: &CaseOutcome) -> Vec<Cell> {
    let mut row = vec![
        Cell::Number(outcome.index as f64),
        Cell::from(outcome.status_label()),
        Cell::Number(outcome.attempt_count as f64),
    ];

    match &outcome.status {
        CaseStatus::Success {
            model_output,
            gender,
            age,
            date,
        } => {
            row.push(gender.as_deref().into());
            row.push(age.as_deref().into());
            row.push(date.as_deref().into());
            row.push(Cell::Text(model_output.clone()));
            row.push(Cell::Text(String::new()));
        }
        CaseStatus::Failed { error_log } => {
            row.extend((0..4).map(|_| Cell::Text(String::new())));
            row.push(Cell::Text(error_log.join("; ")));
        }
    }

    row
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("无法创建输出目录: {}", dir.display()))?;
            info!("已创建输出目录: {}", dir.display());
        }
    }
    Ok(())
}

fn write_xlsx(path: &Path, headers: &[&str], rows: &[Vec<Cell>]) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        let excel_row = (row_idx + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Number(n) => {
                    worksheet.write_number(excel_row, col as u16, *n)?;
                }
                Cell::Text(s) => {
                    let text: String = s.chars().take(XLSX_MAX_CELL_CHARS).collect();
                    worksheet.write_string(excel_row, col as u16, text)?;
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn write_csv(path: &Path, headers: &[&str], rows: &[Vec<Cell>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;

    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.iter().map(Cell::as_text))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    Ok(())
}

fn is_permission_denied(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == ErrorKind::PermissionDenied)
    }) || err.to_string().to_lowercase().contains("permission denied")
}

fn log_saved(path: &Path) {
    info!("文件保存成功: {}", path.display());
    if let Ok(meta) = std::fs::metadata(path) {
        info!("文件大小: {:.1} KB", meta.len() as f64 / 1024.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::case_record::CaseRecord;
    use std::collections::HashMap;

    fn sample_outcomes() -> Vec<CaseOutcome> {
        let mut fields = HashMap::new();
        fields.insert("SEX".to_string(), "男".to_string());
        let case = CaseRecord::new(0, fields);
        vec![
            CaseOutcome::success(&case, 1, "<decision>1</decision>".to_string()),
            CaseOutcome::failed(
                1,
                3,
                vec!["Attempt 1: x".to_string(), "Attempt 2: y, z".to_string()],
            ),
        ]
    }

    #[test]
    fn test_writes_primary_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.xlsx");
        let writer = ResultWriter::new(&path);

        let target = writer.write_outcomes(&sample_outcomes()).unwrap();
        assert_eq!(target, WriteTarget::Primary(path.clone()));
        assert!(path.exists());
    }

    #[test]
    fn test_falls_back_to_csv_when_primary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");
        // 目标位置被目录占用，主格式写入必然失败
        std::fs::create_dir(&path).unwrap();
        let writer = ResultWriter::new(&path);

        let outcomes = sample_outcomes();
        let target = writer.write_outcomes(&outcomes).unwrap();

        assert!(target.is_fallback());
        assert_eq!(target.path(), dir.path().join("results.csv"));

        let mut reader = csv::Reader::from_path(target.path()).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), OUTCOME_COLUMNS.to_vec());
        let records: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), outcomes.len());
        assert_eq!(&records[1][1], "failed");
        assert_eq!(&records[1][7], "Attempt 1: x; Attempt 2: y, z");
    }

    #[test]
    fn test_permission_denied_is_detected() {
        let denied = anyhow::Error::new(std::io::Error::from(ErrorKind::PermissionDenied))
            .context("保存失败");
        assert!(is_permission_denied(&denied));

        let other = anyhow::Error::new(std::io::Error::from(ErrorKind::NotFound));
        assert!(!is_permission_denied(&other));
    }

    #[test]
    fn test_outcome_row_layout() {
        let outcomes = sample_outcomes();
        let row = outcome_row(&outcomes[0]);
        assert_eq!(row.len(), OUTCOME_COLUMNS.len());
        assert_eq!(row[1], Cell::Text("success".to_string()));
        assert_eq!(row[3], Cell::Text("男".to_string()));
    }
}
