//! 批量病例处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量病例的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：加载模板、创建共享的 API 客户端
//! 2. **批量加载**：读取病例表并检查列名（`Dataset`）
//! 3. **并发处理**：委托 [`Dispatcher`] 在固定大小的任务池中处理病例
//! 4. **结果落盘**：排序、统计、写结果表
//! 5. **仅生成提示词**：不调用 API，只把渲染后的提示词写成表格
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个病例的细节
//! - **资源所有者**：唯一持有 API 客户端的模块
//! - **向下委托**：委托 [`CaseFlow`] 处理单个病例

use crate::clients::{ChatApi, LlmClient};
use crate::config::Config;
use crate::models::{load_dataset_async, Dataset, RunSummary};
use crate::orchestrator::dispatcher::{DispatchConfig, Dispatcher};
use crate::orchestrator::report;
use crate::services::result_writer::PROMPT_COLUMNS;
use crate::services::template_renderer::{load_template, DEFAULT_TEMPLATE};
use crate::services::{BackoffPolicy, Cell, RequestExecutor, ResultWriter, TemplateRenderer};
use crate::utils::logging;
use crate::workflow::{CaseFlow, CaseRetryPolicy};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

/// 应用主结构
pub struct App {
    config: Config,
    renderer: Arc<TemplateRenderer>,
    api: Arc<dyn ChatApi>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        let api: Arc<dyn ChatApi> = Arc::new(LlmClient::new(&config));
        Self::with_api(config, api).await
    }

    /// 使用指定的 API 实现初始化（测试时注入假客户端）
    pub async fn with_api(config: Config, api: Arc<dyn ChatApi>) -> Result<Self> {
        let template = match &config.template_path {
            Some(path) => {
                info!("📄 加载模板文件: {}", path);
                load_template(path).await?
            }
            None => DEFAULT_TEMPLATE.to_string(),
        };
        let renderer = Arc::new(TemplateRenderer::new(template, &config.unknown_sentinel)?);

        Ok(Self {
            config,
            renderer,
            api,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let dataset = self.load_cases().await?;

        if self.config.render_only {
            self.render_prompts(&dataset)?;
        } else {
            self.analyze(dataset).await?;
        }

        Ok(())
    }

    /// 加载病例表并检查列
    pub async fn load_cases(&self) -> Result<Dataset> {
        info!("\n📁 正在读取病例表: {}", self.config.input_path);
        let dataset = load_dataset_async(&self.config.input_path)
            .await
            .with_context(|| format!("读取病例表失败: {}", self.config.input_path))?;

        let missing = self.renderer.missing_columns(&dataset.columns);
        logging::log_cases_loaded(&dataset, &missing);

        Ok(dataset)
    }

    /// 分析全部病例并写结果表
    ///
    /// 写文件失败只记录日志，不影响返回的统计。
    pub async fn analyze(&self, dataset: Dataset) -> Result<RunSummary> {
        let executor = RequestExecutor::new(self.api.clone(), BackoffPolicy::from_config(&self.config));
        let flow = Arc::new(CaseFlow::new(
            self.renderer.clone(),
            executor,
            CaseRetryPolicy::from_config(&self.config),
        ));

        let dispatcher = Dispatcher::new(DispatchConfig::from_config(&self.config));
        let outcomes = dispatcher.run(dataset.cases, flow).await;

        let (outcomes, summary) = report::aggregate(outcomes);

        let writer = ResultWriter::new(&self.config.output_path);
        let saved_to = match writer.write_outcomes(&outcomes) {
            Ok(target) => target.path().display().to_string(),
            Err(e) => {
                error!("❌ 结果文件保存失败: {:#}", e);
                String::from("(未保存)")
            }
        };

        report::log_report(&summary);
        logging::print_final_stats(&summary, &saved_to, &self.config.log_file);

        Ok(summary)
    }

    /// 仅生成提示词，不调用 API
    pub fn render_prompts(&self, dataset: &Dataset) -> Result<()> {
        info!("📝 生成 {} 个病例的提示词", dataset.len());

        let rows: Vec<Vec<Cell>> = dataset
            .cases
            .iter()
            .map(|case| {
                vec![
                    Cell::Number(case.index() as f64),
                    Cell::from(case.patient_id()),
                    Cell::from(case.gender()),
                    Cell::from(case.age()),
                    Cell::from(case.date()),
                    Cell::Text(self.renderer.render(case)),
                ]
            })
            .collect();

        let writer = ResultWriter::new(&self.config.prompts_output_path);
        let target = writer.write_table(&PROMPT_COLUMNS, &rows)?;
        info!("✓ 提示词已保存至: {}", target.path().display());

        Ok(())
    }
}
