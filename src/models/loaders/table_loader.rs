use crate::error::{AppError, FileError};
use crate::models::case_record::CaseRecord;
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashMap;
use std::path::Path;

/// 加载后的病例表
#[derive(Debug, Clone)]
pub struct Dataset {
    /// 表头（按原始顺序）
    pub columns: Vec<String>,
    pub cases: Vec<CaseRecord>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// 按扩展名加载病例表（.xlsx/.xlsm/.xls/.ods 或 .csv）
///
/// 第一行为表头；全空的行被跳过，之后才分配 `index`。
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(AppError::File(FileError::NotFound {
            path: path.display().to_string(),
        })
        .into());
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (columns, rows) = match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path)?,
        "csv" => read_csv(path)?,
        _ => {
            return Err(AppError::File(FileError::UnsupportedFormat {
                path: path.display().to_string(),
            })
            .into())
        }
    };

    Ok(build_dataset(columns, rows))
}

/// 异步包装，表格解析放到阻塞线程池
pub async fn load_dataset_async(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || load_dataset(&path))
        .await
        .context("加载任务执行失败")?
}

fn build_dataset(columns: Vec<String>, rows: Vec<Vec<String>>) -> Dataset {
    let cases = rows
        .into_iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .enumerate()
        .map(|(index, row)| {
            let fields: HashMap<String, String> = columns
                .iter()
                .zip(row)
                .filter(|(column, value)| !column.is_empty() && !value.trim().is_empty())
                .map(|(column, value)| (column.clone(), value))
                .collect();
            CaseRecord::new(index, fields)
        })
        .collect();

    Dataset { columns, cases }
}

fn read_workbook(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            AppError::File(FileError::EmptyWorkbook {
                path: path.display().to_string(),
            })
        })?
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let mut rows = range.rows();
    let columns = match rows.next() {
        Some(header) => header.iter().map(|c| cell_to_string(c).trim().to_string()).collect(),
        None => Vec::new(),
    };
    let rows = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Ok((columns, rows))
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let columns = reader
        .headers()
        .with_context(|| format!("无法读取表头: {}", path.display()))?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("无法解析CSV行: {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok((columns, rows))
}

/// 单元格转文本；整数值的浮点数去掉小数点
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| {
                if d.time() == chrono::NaiveTime::MIN {
                    d.format("%Y-%m-%d").to_string()
                } else {
                    d.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            })
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{:?}", e),
    }
}
