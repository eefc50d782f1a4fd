//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和任务调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量病例处理器
//! - 管理应用生命周期（初始化、运行）
//! - 加载病例表（Dataset）
//! - 持有共享的 API 客户端
//! - 写结果表、输出全局统计
//!
//! ### `dispatcher` - 病例调度器
//! - 控制并发数量（Semaphore）
//! - 收集无序结果（mpsc channel）
//! - 每完成 N 个病例全局冷却
//!
//! ### `report` - 结果汇总
//! - 按 index 排序
//! - 成功率、格式警告数、平均尝试次数
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Dataset)
//!     ↓
//! dispatcher (并发处理 Vec<CaseRecord>)
//!     ↓
//! workflow::CaseFlow (处理单个病例)
//!     ↓
//! services (能力层：render / execute / write)
//!     ↓
//! clients (ChatApi)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管生命周期，dispatcher 管并发
//! 2. **资源隔离**：只有编排层创建 API 客户端
//! 3. **向下依赖**：编排层 → workflow → services → clients
//! 4. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod batch_processor;
pub mod dispatcher;
pub mod report;

// 重新导出主要类型
pub use batch_processor::App;
pub use dispatcher::{DispatchConfig, Dispatcher};
pub use report::{aggregate, log_report};
