//! 病例处理流程 - 流程层
//!
//! 核心职责：定义"一个病例"的完整处理流程
//!
//! 流程顺序：
//! 1. 渲染提示词
//! 2. 最多 N 次外层尝试：执行请求 → 检查空响应 → 检查格式
//! 3. 全部失败则返回带完整错误日志的失败结果
//!
//! 外层重试处理应用层异常（空响应、频率限制），
//! 内层 [`RequestExecutor`] 处理传输层的短暂故障。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::models::{CaseOutcome, CaseRecord};
use crate::services::{RequestExecutor, TemplateRenderer};
use crate::workflow::format_check;

/// 病例处理器
///
/// 编排层只依赖这个 trait，不了解模板和 API 细节。实现不得返回错误，
/// 所有失败都记录在 [`CaseOutcome`] 中。
#[async_trait]
pub trait CaseProcessor: Send + Sync {
    async fn process(&self, case: &CaseRecord) -> CaseOutcome;
}

/// 外层重试策略（病例级）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRetryPolicy {
    pub max_attempts: u32,
    /// 频率限制后的固定暂停
    pub rate_limit_pause: Duration,
}

impl Default for CaseRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_pause: Duration::from_secs(15),
        }
    }
}

impl CaseRetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.case_max_attempts,
            rate_limit_pause: config.rate_limit_pause(),
        }
    }
}

/// 病例处理流程
///
/// - 持有共享的渲染器和请求执行器
/// - 决定何时重试、何时暂停、何时放弃
pub struct CaseFlow {
    renderer: Arc<TemplateRenderer>,
    executor: RequestExecutor,
    policy: CaseRetryPolicy,
}

impl CaseFlow {
    pub fn new(
        renderer: Arc<TemplateRenderer>,
        executor: RequestExecutor,
        policy: CaseRetryPolicy,
    ) -> Self {
        Self {
            renderer,
            executor,
            policy,
        }
    }

    pub async fn run(&self, case: &CaseRecord) -> CaseOutcome {
        let case_no = case.index();
        let prompt = self.renderer.render(case);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut error_log: Vec<String> = Vec::new();
        let mut attempts_used = 0;

        for attempt in 1..=max_attempts {
            attempts_used = attempt;

            match self.executor.execute(&prompt).await {
                Ok(raw) if raw.trim().is_empty() => {
                    warn!("[病例 {}] ⚠️ 第 {} 次尝试返回空响应", case_no, attempt);
                    error_log.push(format!("Attempt {}: EmptyResponse - Empty Response", attempt));
                }
                Ok(raw) => {
                    let (model_output, warning) = format_check::annotate(&raw);
                    match warning {
                        Some(w) => warn!("[病例 {}] ⚠️ 输出格式警告: {}", case_no, w.annotation()),
                        None => info!("[病例 {}] ✓ 第 {} 次尝试成功", case_no, attempt),
                    }
                    return CaseOutcome::success(case, attempt, model_output);
                }
                Err(err) => {
                    warn!("[病例 {}] 第 {} 次尝试失败 [{}]: {}", case_no, attempt, err.kind(), err);
                    error_log.push(format!("Attempt {}: {} - {}", attempt, err.kind(), err));

                    match err {
                        ApiError::Permanent { .. } => break,
                        ApiError::RateLimited { .. } if attempt < max_attempts => {
                            info!(
                                "[病例 {}] 触发频率限制，暂停 {} 秒",
                                case_no,
                                self.policy.rate_limit_pause.as_secs()
                            );
                            sleep(self.policy.rate_limit_pause).await;
                        }
                        _ => {}
                    }
                }
            }
        }

        error!("[病例 {}] ❌ 处理失败: {}", case_no, error_log.join("; "));
        CaseOutcome::failed(case_no, attempts_used, error_log)
    }
}

#[async_trait]
impl CaseProcessor for CaseFlow {
    async fn process(&self, case: &CaseRecord) -> CaseOutcome {
        self.run(case).await
    }
}
