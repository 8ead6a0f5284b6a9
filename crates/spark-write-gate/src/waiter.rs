//! 单次赋值的排空等待者。
//!
//! ## 意图（Why）
//! - `resume_writing`、`connection_lost` 与取消三条路径都可能去结算同一个等待者，
//!   “只结算一次”必须由等待者自身的检查并设置完成，而不是依赖闸门层面的加锁顺序。
//!
//! ## 契约（What）
//! - [`DrainWaiter`] 初始为 `Pending`，首次调用 `release`/`fail`/`cancel` 之一后进入 `Settled`，
//!   之后的结算调用一律返回 `false` 且不改变结果；
//! - [`DrainWaiter::wait`] 返回的 Future 在结算后就绪，并产出结算结果的副本；
//! - 克隆只增加引用计数，所有克隆观察同一状态。

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use parking_lot::Mutex;

use crate::error::TransportError;

/// 等待者的结算结果。
#[derive(Clone, Debug)]
pub enum DrainOutcome {
    /// 写入许可恢复，或连接无错关闭。
    Released,
    /// 连接带错关闭，携带传输层原始错误。
    Failed(TransportError),
    /// 等待被撤销。
    Cancelled,
}

impl DrainOutcome {
    /// 结果是否由取消产生。
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DrainOutcome::Cancelled)
    }
}

enum WaiterState {
    Pending(Option<Waker>),
    Settled(DrainOutcome),
}

struct WaiterShared {
    id: u64,
    state: Mutex<WaiterState>,
}

/// 单次赋值 Future 的结算端与观察端合一的句柄。
///
/// # 教案式注释
///
/// ## 逻辑 (How)
/// - 内部状态以 `parking_lot::Mutex` 保护，临界区只包含状态切换，唤醒在释放锁之后进行；
/// - `Pending` 分支只保存最近一次轮询登记的 `Waker`，符合单等待者约定。
///
/// ## 注意事项 (Trade-offs)
/// - 同一等待者可以被多个 [`WaitFuture`] 同时观察，但只有最后登记的 `Waker` 会被唤醒；
///   闸门内部始终只有一个观察者。
#[derive(Clone)]
pub struct DrainWaiter {
    shared: Arc<WaiterShared>,
}

impl DrainWaiter {
    /// 以给定标识创建处于 `Pending` 的等待者。
    pub fn new(id: u64) -> Self {
        Self {
            shared: Arc::new(WaiterShared {
                id,
                state: Mutex::new(WaiterState::Pending(None)),
            }),
        }
    }

    /// 调度器分配的标识，用于日志关联。
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// 是否已经结算。
    pub fn is_settled(&self) -> bool {
        matches!(*self.shared.state.lock(), WaiterState::Settled(_))
    }

    /// 读取结算结果；尚未结算时返回 `None`。
    pub fn outcome(&self) -> Option<DrainOutcome> {
        match &*self.shared.state.lock() {
            WaiterState::Pending(_) => None,
            WaiterState::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// 以成功结算。返回 `false` 表示此前已经结算。
    pub fn release(&self) -> bool {
        self.settle(DrainOutcome::Released)
    }

    /// 以传输错误结算。返回 `false` 表示此前已经结算。
    pub fn fail(&self, error: TransportError) -> bool {
        self.settle(DrainOutcome::Failed(error))
    }

    /// 以取消结算。返回 `false` 表示此前已经结算。
    pub fn cancel(&self) -> bool {
        self.settle(DrainOutcome::Cancelled)
    }

    /// 两个句柄是否指向同一个等待者。
    pub fn same_as(&self, other: &DrainWaiter) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// 返回在结算后就绪的 Future。
    pub fn wait(&self) -> WaitFuture {
        WaitFuture {
            waiter: self.clone(),
        }
    }

    fn settle(&self, outcome: DrainOutcome) -> bool {
        let waker = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                WaiterState::Settled(_) => return false,
                WaiterState::Pending(waker) => {
                    let waker = waker.take();
                    *state = WaiterState::Settled(outcome);
                    waker
                }
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }
}

impl fmt::Debug for DrainWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainWaiter")
            .field("id", &self.shared.id)
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// [`DrainWaiter::wait`] 返回的 Future。
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WaitFuture {
    waiter: DrainWaiter,
}

impl Future for WaitFuture {
    type Output = DrainOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.waiter.shared.state.lock();
        match &mut *state {
            WaiterState::Settled(outcome) => Poll::Ready(outcome.clone()),
            WaiterState::Pending(slot) => {
                match slot {
                    Some(existing) if existing.will_wake(cx.waker()) => {}
                    _ => *slot = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
        }
    }
}
