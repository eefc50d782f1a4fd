//! # Medical Batch Analysis
//!
//! 一个用于批量病例 LLM 分析的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 持有外部连接，只暴露能力
//! - `ChatApi` - 单轮对话补全接口，`LlmClient` 为 OpenAI 兼容实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个病例或单张表
//! - `TemplateRenderer` - 提示词渲染能力
//! - `RequestExecutor` - 带指数退避的请求能力
//! - `ResultWriter` - 写结果表能力（xlsx，失败回退 csv）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个病例"的完整处理流程
//! - `CaseFlow` - 流程编排（render → execute → 格式检查 → 重试）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 应用入口，管理资源
//! - `orchestrator/dispatcher` - 并发调度与全局冷却
//! - `orchestrator/report` - 排序与统计
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ChatApi, LlmClient};
pub use config::Config;
pub use error::{ApiError, AppError};
pub use models::{CaseOutcome, CaseRecord, CaseStatus, Dataset, RunSummary};
pub use orchestrator::{App, Dispatcher};
pub use workflow::{CaseFlow, CaseProcessor};
