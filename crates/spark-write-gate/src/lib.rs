#![deny(unsafe_code)]
#![doc = r#"
# spark-write-gate

## 设计动机（Why）
- **定位**：该 crate 提供字节流连接处理器的写侧背压闸门，位于产生出站字节的应用与
  只能按有限速率接收字节的传输层之间；
- **架构角色**：传输层通过 `pause_writing`/`resume_writing`/`connection_lost` 驱动闸门，
  生产者在写入前调用 `await_drain` 获取写入许可；
- **设计理念**：暂停、恢复、连接丢失与任务取消是四个互相独立的触发源，任何交错下挂起的
  生产者都恰好被放行一次。

## 核心契约（What）
- **输入条件**：传输在连接结束时恰好调用一次 [`WriteGate::connection_lost`]；同一时刻至多
  一个生产者挂起在 [`WriteGate::await_drain`] 中；
- **输出保障**：`await_drain` 只会返回成功、[`DrainError::ConnectionReset`]、传输层原始错误
  （[`DrainError::ConnectionLost`]），或随 Future 被丢弃而取消；
- **前置约束**：闸门不缓存数据、不分帧、不重试，也不统计指标。

## 实现策略（How）
- **单次赋值等待者**：[`DrainWaiter`] 以检查并设置保证只结算一次；
- **调度器注入**：等待者由注入的 [`Scheduler`] 创建，[`InlineScheduler::ambient`] 仅在边界层
  作为默认值；
- **取消清理**：`await_drain` 内部的清理守卫在正常返回与 Future 丢弃两条路径上都会清空
  等待者槽位。

## 风险与考量（Trade-offs）
- **运行时中立**：闸门只依赖标准 `Waker`，任何执行器都能驱动；测试使用 Tokio 单线程运行时；
- **单等待者**：第二个并发调用方得到 [`DrainError::ConcurrentDrain`]，如需多生产者排队，
  应在闸门之上串行化。
"#]

mod config;
mod error;
mod gate;
mod scheduler;
mod transport;
mod waiter;

pub use config::WriteGateConfig;
pub use error::{DrainError, ReadControlError, TransportError};
pub use gate::WriteGate;
pub use scheduler::{InlineScheduler, Scheduler};
pub use transport::Transport;
pub use waiter::{DrainOutcome, DrainWaiter, WaitFuture};
