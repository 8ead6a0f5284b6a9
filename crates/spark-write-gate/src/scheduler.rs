use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, Ordering},
};

use crate::waiter::DrainWaiter;

/// 为闸门创建单次赋值等待者的调度器句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 闸门核心不感知具体执行器：挂起与唤醒只依赖标准 `Waker`，等待者的创建则交给注入的调度器，
///   测试可以替换为记录型实现来观察“是否创建过等待者”。
///
/// ## 契约说明（What）
/// - `create_waiter`：返回一个全新的、处于 `Pending` 的 [`DrainWaiter`]；
/// - `name`：调度器名称，仅用于日志；
/// - **前置条件**：实现必须线程安全，闸门可能在任意任务上调用它；`create_waiter` 在闸门内部
///   状态锁内执行，不得回调同一个闸门；
/// - **后置条件**：返回的等待者不得已被结算或被其他闸门持有。
pub trait Scheduler: Send + Sync + 'static {
    /// 创建新的等待者。
    fn create_waiter(&self) -> DrainWaiter;

    /// 调度器名称。
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// 运行时中立的默认调度器，按单调递增序号分配等待者标识。
#[derive(Debug)]
pub struct InlineScheduler {
    next_id: AtomicU64,
}

impl InlineScheduler {
    /// 创建序号从 1 开始的调度器。
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// 进程级共享的环境调度器，仅供边界层（[`crate::WriteGate::ambient`]）使用。
    pub fn ambient() -> Arc<dyn Scheduler> {
        static AMBIENT: OnceLock<Arc<InlineScheduler>> = OnceLock::new();
        AMBIENT
            .get_or_init(|| Arc::new(InlineScheduler::new()))
            .clone()
    }
}

impl Default for InlineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for InlineScheduler {
    fn create_waiter(&self) -> DrainWaiter {
        DrainWaiter::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}
