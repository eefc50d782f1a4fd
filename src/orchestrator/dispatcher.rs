//! 病例调度器 - 编排层
//!
//! ## 职责
//!
//! 1. **并发控制**：使用 Semaphore 把同时处理的病例数限制为 `concurrency`
//! 2. **结果收集**：通过 channel 汇总每个任务的结果，完成顺序任意
//! 3. **全局冷却**：每完成 `cooldown_every` 个病例，暂停派发新病例一段时间
//! 4. **进度输出**：每收到一个结果输出一次 `完成数/总数`
//!
//! 只调用 [`CaseProcessor`]，不了解模板和 API 细节。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, RwLock, RwLockWriteGuard, Semaphore};
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::Config;
use crate::models::{CaseOutcome, CaseRecord};
use crate::workflow::CaseProcessor;

/// 调度配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// 并发任务数（>= 1）
    pub concurrency: usize,
    /// 每完成多少个病例冷却一次，0 表示不冷却
    pub cooldown_every: usize,
    pub cooldown: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            cooldown_every: 20,
            cooldown: Duration::from_secs(150),
        }
    }
}

impl DispatchConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.max_concurrent_cases,
            cooldown_every: config.cooldown_every,
            cooldown: config.cooldown(),
        }
    }
}

/// 全局冷却闸门
///
/// 完成计数是任务间唯一共享的计数器。计数到达阈值的任务拿到写锁并负责冷却；
/// 派发循环在启动每个病例前都要拿一次读锁，因此冷却期间不会有新病例开始，
/// 正在执行的病例不受影响。
struct CooldownGate {
    every: usize,
    pause: Duration,
    total: usize,
    completed: AtomicUsize,
    gate: RwLock<()>,
}

impl CooldownGate {
    fn new(config: &DispatchConfig, total: usize) -> Self {
        Self {
            every: config.cooldown_every,
            pause: config.cooldown,
            total,
            completed: AtomicUsize::new(0),
            gate: RwLock::new(()),
        }
    }

    /// 冷却期间阻塞
    async fn wait_open(&self) {
        let _open = self.gate.read().await;
    }

    /// 记录一次完成；到达阈值（且不是最后一个）时返回写锁
    async fn record_completion(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.every > 0 && completed < self.total && completed % self.every == 0 {
            info!(
                "⏸️ 已完成 {} 个病例，全局冷却 {} 秒",
                completed,
                self.pause.as_secs()
            );
            Some(self.gate.write().await)
        } else {
            None
        }
    }
}

/// 病例调度器
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// 处理全部病例，返回顺序不定的结果（每个病例恰好一个）
    pub async fn run(
        &self,
        cases: Vec<CaseRecord>,
        processor: Arc<dyn CaseProcessor>,
    ) -> Vec<CaseOutcome> {
        let total = cases.len();
        if total == 0 {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let gate = Arc::new(CooldownGate::new(&self.config, total));
        let (tx, mut rx) = mpsc::unbounded_channel();

        log_dispatch_start(total, &self.config);

        let feeder = tokio::spawn(dispatch_all(cases, processor, semaphore, gate, tx));

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = rx.recv().await {
            log_progress(outcomes.len() + 1, total, &outcome);
            outcomes.push(outcome);
        }

        if let Err(e) = feeder.await {
            error!("调度任务异常退出: {}", e);
        }

        outcomes
    }
}

/// 依次为每个病例申请许可并启动任务
///
/// 先拿许可再过闸门：触发冷却的任务在释放许可前已经持有写锁。
async fn dispatch_all(
    cases: Vec<CaseRecord>,
    processor: Arc<dyn CaseProcessor>,
    semaphore: Arc<Semaphore>,
    gate: Arc<CooldownGate>,
    tx: mpsc::UnboundedSender<CaseOutcome>,
) {
    for case in cases {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("[病例 {}] 获取许可失败: {}", case.index(), e);
                let _ = tx.send(CaseOutcome::failed(
                    case.index(),
                    1,
                    vec![format!("调度失败: {}", e)],
                ));
                continue;
            }
        };
        gate.wait_open().await;

        let processor = processor.clone();
        let gate = gate.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let index = case.index();
            let outcome = match AssertUnwindSafe(processor.process(&case))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("[病例 {}] 任务执行失败: 处理过程中 panic", index);
                    CaseOutcome::failed(index, 1, vec!["任务执行失败: panic".to_string()])
                }
            };

            let cooldown = gate.record_completion().await;
            let _ = tx.send(outcome);
            drop(permit);

            if let Some(_closed) = cooldown {
                sleep(gate.pause).await;
                info!("▶️ 冷却结束，继续处理");
            }
        });
    }
}

// ========== 日志辅助函数 ==========

fn log_dispatch_start(total: usize, config: &DispatchConfig) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始分析 {} 个病例", total);
    info!("📊 并发数: {}", config.concurrency);
    if config.cooldown_every > 0 {
        info!(
            "⏱️ 每完成 {} 个病例冷却 {} 秒",
            config.cooldown_every,
            config.cooldown.as_secs()
        );
    }
    info!("{}", "=".repeat(60));
}

fn log_progress(completed: usize, total: usize, outcome: &CaseOutcome) {
    let mark = if outcome.is_success() { "✓" } else { "✗" };
    info!(
        "📈 分析进度 {}/{} ({:.0}%) {} 病例 {}",
        completed,
        total,
        completed as f64 * 100.0 / total as f64,
        mark,
        outcome.index
    );
}
