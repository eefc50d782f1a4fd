//! 请求执行服务 - 业务能力层
//!
//! 只负责"把一次 API 调用做成功"：对临时错误做指数退避重试，
//! 永久错误立即返回。不产生病例级别的结果。

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::clients::ChatApi;
use crate::config::Config;
use crate::error::ApiError;

/// 内层重试策略（指数退避）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 是否在等待时间上叠加随机抖动
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.api_max_attempts,
            initial_delay: Duration::from_secs(config.api_initial_delay_secs),
            max_delay: Duration::from_secs(config.api_max_delay_secs),
            jitter: true,
        }
    }

    /// 第 `attempt` 次失败后的基础等待时间（从 1 开始）：initial * 2^(attempt-1)，不超过上限
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter {
            (base + random_jitter(base)).min(self.max_delay)
        } else {
            base
        }
    }
}

/// 请求执行器
///
/// 职责：
/// - 调用 [`ChatApi`]
/// - 临时错误和频率限制按 [`BackoffPolicy`] 重试
/// - 次数用尽时原样返回最后一个错误
pub struct RequestExecutor {
    api: Arc<dyn ChatApi>,
    policy: BackoffPolicy,
}

impl RequestExecutor {
    pub fn new(api: Arc<dyn ChatApi>, policy: BackoffPolicy) -> Self {
        Self { api, policy }
    }

    pub async fn execute(&self, prompt: &str) -> Result<String, ApiError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.api.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if !err.is_retryable() => {
                    debug!("永久错误，不重试: {}", err);
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    warn!("请求重试 {} 次后仍失败: {}", max_attempts, err);
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "请求失败 [{}] (尝试 {}/{})，{:.1} 秒后重试: {}",
                        err.kind(),
                        attempt,
                        max_attempts,
                        delay.as_secs_f64(),
                        err
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// 随机抖动，最多为基础等待时间的 1/4
fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms = (base_delay.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    let jitter_ms = rand::rng().random_range(0..max_jitter_ms);
    Duration::from_millis(jitter_ms)
}
