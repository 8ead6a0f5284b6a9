use std::{borrow::Cow, fmt, mem, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    config::WriteGateConfig,
    error::{DrainError, TransportError},
    scheduler::{InlineScheduler, Scheduler},
    transport::Transport,
    waiter::{DrainOutcome, DrainWaiter},
};

/// 传输句柄槽位：`connection_made` 之前与 `connection_lost` 之后均为 `Detached`。
enum TransportSlot {
    Detached,
    Attached(Arc<dyn Transport>),
}

impl TransportSlot {
    fn describe(&self) -> Cow<'static, str> {
        match self {
            TransportSlot::Detached => Cow::Borrowed("detached"),
            TransportSlot::Attached(transport) => Cow::Owned(transport.id().into_owned()),
        }
    }
}

/// 等待者槽位，单占用。
enum WaiterSlot {
    Idle,
    Waiting(DrainWaiter),
}

struct GateState {
    transport: TransportSlot,
    paused: bool,
    reading_paused: bool,
    connection_lost: bool,
    drain_waiter: WaiterSlot,
}

/// 写侧背压闸门：连接生命周期跟踪 + 排空协调。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 传输层以 `pause_writing`/`resume_writing` 表达写缓冲水位，生产者在每次（或每批）写入前
///   调用 [`WriteGate::await_drain`] 获取写入许可；
/// - 连接丢失、恢复写入与生产者取消三类触发源互相独立，闸门保证挂起的生产者恰好被放行一次，
///   既不遗留（死锁），也不重复结算。
///
/// ## 逻辑 (How)
/// - 全部状态位于一把 `parking_lot::Mutex` 之下，临界区内不 `await`、不唤醒任务；
/// - 结算与清槽分离：`resume_writing`/`connection_lost` 只结算等待者，槽位由创建它的
///   `await_drain` 调用在展开时清空，取消路径同样经过这段清理；
/// - “只结算一次”由 [`DrainWaiter`] 自身的检查并设置保证。
///
/// ## 契约 (What)
/// - `connection_made`：保存传输句柄；
/// - `connection_lost`：标记连接丢失、释放传输句柄、以成功或传输错误结算挂起的等待者；
/// - `pause_writing`/`resume_writing`：切换暂停位，恢复时以成功结算等待者；
/// - `await_drain`：连接已丢失时立即返回 [`DrainError::ConnectionReset`]；未暂停时立即成功；
///   否则挂起直到被结算；
/// - **前置条件**：同一时刻至多一个生产者挂起在 `await_drain` 中，违反时第二个调用方得到
///   [`DrainError::ConcurrentDrain`]；`connection_lost` 由传输恰好投递一次；
/// - **后置条件**：`await_drain` 返回（或其 Future 被丢弃）后，等待者槽位已清空。
///
/// ## 注意事项 (Trade-offs)
/// - 闸门不缓存数据、不做重试，也不提供关闭接口，关闭时机由传输决定；
/// - 一个闸门实例只服务一次连接尝试，连接丢失后不可复用。
pub struct WriteGate {
    scheduler: Arc<dyn Scheduler>,
    config: WriteGateConfig,
    state: Mutex<GateState>,
}

impl WriteGate {
    /// 以注入的调度器和默认配置创建闸门。
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_config(scheduler, WriteGateConfig::default())
    }

    /// 以注入的调度器和给定配置创建闸门。
    pub fn with_config(scheduler: Arc<dyn Scheduler>, config: WriteGateConfig) -> Self {
        Self {
            scheduler,
            config,
            state: Mutex::new(GateState {
                transport: TransportSlot::Detached,
                paused: false,
                reading_paused: false,
                connection_lost: false,
                drain_waiter: WaiterSlot::Idle,
            }),
        }
    }

    /// 使用进程级环境调度器创建闸门，仅供边界层使用。
    pub fn ambient() -> Self {
        Self::new(InlineScheduler::ambient())
    }

    /// 注入的调度器。
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// 当前配置。
    pub fn config(&self) -> &WriteGateConfig {
        &self.config
    }

    /// 传输连接建立。
    pub fn connection_made(&self, transport: Arc<dyn Transport>) {
        let id = transport.id().into_owned();
        self.state.lock().transport = TransportSlot::Attached(transport);
        debug!(gate = %self.config.label(), transport = %id, "connection made");
    }

    /// 传输连接结束；`error` 为 `None` 表示正常关闭。
    ///
    /// 挂起的等待者以成功（无错误）或原始传输错误结算，已被结算或取消的等待者保持原状。
    /// 等待者槽位不在此处清空。
    pub fn connection_lost(&self, error: Option<TransportError>) {
        let (transport, waiter) = {
            let mut state = self.state.lock();
            state.connection_lost = true;
            state.paused = false;
            let transport = mem::replace(&mut state.transport, TransportSlot::Detached);
            (transport, state.drain_waiter.current())
        };
        debug!(
            gate = %self.config.label(),
            transport = %transport.describe(),
            error = ?error,
            "connection lost"
        );

        if let Some(waiter) = waiter {
            let settled = match error {
                None => waiter.release(),
                Some(error) => waiter.fail(error),
            };
            self.trace_settlement(&waiter, settled, "connection_lost");
        }
    }

    /// 传输写缓冲越过高水位，暂停写入。
    pub fn pause_writing(&self) {
        let was_paused = mem::replace(&mut self.state.lock().paused, true);
        if !was_paused {
            debug!(gate = %self.config.label(), "writing paused");
        }
    }

    /// 传输写缓冲回落，恢复写入并以成功结算挂起的等待者。
    pub fn resume_writing(&self) {
        let waiter = {
            let mut state = self.state.lock();
            state.paused = false;
            state.drain_waiter.current()
        };
        debug!(gate = %self.config.label(), "writing resumed");

        if let Some(waiter) = waiter {
            let settled = waiter.release();
            self.trace_settlement(&waiter, settled, "resume_writing");
        }
    }

    /// 请求传输暂停读取；仅在连接存活且尚未暂停时转发。
    pub fn pause_reading(&self) {
        let transport = {
            let mut state = self.state.lock();
            if state.reading_paused {
                return;
            }
            let TransportSlot::Attached(transport) = &state.transport else {
                return;
            };
            let transport = Arc::clone(transport);
            state.reading_paused = true;
            transport
        };
        if let Err(err) = transport.pause_reading() {
            debug!(gate = %self.config.label(), transport = %transport.id(), error = %err, "transport ignored pause_reading");
        }
    }

    /// 请求传输恢复读取；仅在连接存活且处于暂停时转发。
    pub fn resume_reading(&self) {
        let transport = {
            let mut state = self.state.lock();
            if !state.reading_paused {
                return;
            }
            let TransportSlot::Attached(transport) = &state.transport else {
                return;
            };
            let transport = Arc::clone(transport);
            state.reading_paused = false;
            transport
        };
        if let Err(err) = transport.resume_reading() {
            debug!(gate = %self.config.label(), transport = %transport.id(), error = %err, "transport ignored resume_reading");
        }
    }

    /// 等待写入许可。
    ///
    /// - 连接已丢失：立即返回 [`DrainError::ConnectionReset`]，不创建等待者；
    /// - 未暂停：立即返回 `Ok(())`；
    /// - 已暂停：挂起直到 `resume_writing`（成功）或 `connection_lost`（成功/原始错误）。
    ///
    /// 丢弃返回的 Future 即取消等待：等待者以取消结算，槽位被清空，之后到达的
    /// `resume_writing`/`connection_lost` 不会再结算它。
    pub async fn await_drain(&self) -> Result<(), DrainError> {
        let Some(waiter) = self.enter_drain()? else {
            return Ok(());
        };

        let cleanup = DrainCleanup {
            gate: self,
            waiter: waiter.clone(),
        };
        let outcome = waiter.wait().await;
        drop(cleanup);

        match outcome {
            DrainOutcome::Released => Ok(()),
            DrainOutcome::Failed(error) => Err(DrainError::ConnectionLost(error)),
            DrainOutcome::Cancelled => Err(DrainError::Cancelled),
        }
    }

    /// 传输句柄是否存在。
    pub fn is_connected(&self) -> bool {
        matches!(self.state.lock().transport, TransportSlot::Attached(_))
    }

    /// 当前持有的传输句柄。
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        match &self.state.lock().transport {
            TransportSlot::Attached(transport) => Some(Arc::clone(transport)),
            TransportSlot::Detached => None,
        }
    }

    /// 写入是否处于暂停。
    pub fn is_writing_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// 读取是否处于暂停。
    pub fn is_reading_paused(&self) -> bool {
        self.state.lock().reading_paused
    }

    /// 连接是否已标记丢失。
    pub fn is_connection_lost(&self) -> bool {
        self.state.lock().connection_lost
    }

    /// 是否有生产者挂起（等待者槽位被占用）。
    pub fn has_pending_drain(&self) -> bool {
        matches!(self.state.lock().drain_waiter, WaiterSlot::Waiting(_))
    }

    fn enter_drain(&self) -> Result<Option<DrainWaiter>, DrainError> {
        let mut state = self.state.lock();
        if state.connection_lost {
            debug!(gate = %self.config.label(), "drain requested after connection loss");
            return Err(DrainError::ConnectionReset {
                message: self.config.reset_message_owned(),
            });
        }
        if !state.paused {
            return Ok(None);
        }
        if let WaiterSlot::Waiting(existing) = &state.drain_waiter {
            warn!(
                gate = %self.config.label(),
                waiter = existing.id(),
                "another producer is already waiting for drain on this gate"
            );
            return Err(DrainError::ConcurrentDrain);
        }

        let waiter = self.scheduler.create_waiter();
        state.drain_waiter = WaiterSlot::Waiting(waiter.clone());
        trace!(
            gate = %self.config.label(),
            waiter = waiter.id(),
            scheduler = self.scheduler.name(),
            "producer suspended until drain"
        );
        Ok(Some(waiter))
    }

    fn leave_drain(&self, waiter: &DrainWaiter) {
        let mut state = self.state.lock();
        if matches!(&state.drain_waiter, WaiterSlot::Waiting(current) if current.same_as(waiter)) {
            state.drain_waiter = WaiterSlot::Idle;
        }
    }

    fn trace_settlement(&self, waiter: &DrainWaiter, settled: bool, trigger: &'static str) {
        if settled {
            trace!(gate = %self.config.label(), waiter = waiter.id(), trigger, "drain waiter settled");
        } else {
            trace!(
                gate = %self.config.label(),
                waiter = waiter.id(),
                trigger,
                cancelled = waiter.outcome().is_some_and(|outcome| outcome.is_cancelled()),
                "drain waiter already settled"
            );
        }
    }
}

impl WaiterSlot {
    fn current(&self) -> Option<DrainWaiter> {
        match self {
            WaiterSlot::Idle => None,
            WaiterSlot::Waiting(waiter) => Some(waiter.clone()),
        }
    }
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::ambient()
    }
}

impl fmt::Debug for WriteGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WriteGate")
            .field("label", &self.config.label())
            .field("scheduler", &self.scheduler.name())
            .field("transport", &state.transport.describe())
            .field("paused", &state.paused)
            .field("reading_paused", &state.reading_paused)
            .field("connection_lost", &state.connection_lost)
            .field(
                "drain_waiter",
                &matches!(state.drain_waiter, WaiterSlot::Waiting(_)),
            )
            .finish()
    }
}

/// `await_drain` 挂起期间的清理守卫；无论正常返回还是 Future 被丢弃都会执行。
struct DrainCleanup<'a> {
    gate: &'a WriteGate,
    waiter: DrainWaiter,
}

impl Drop for DrainCleanup<'_> {
    fn drop(&mut self) {
        if self.waiter.cancel() {
            trace!(gate = %self.gate.config.label(), waiter = self.waiter.id(), "drain wait cancelled");
        }
        self.gate.leave_drain(&self.waiter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadControlError;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct FlowTransport {
        pauses: AtomicUsize,
        resumes: AtomicUsize,
    }

    impl Transport for FlowTransport {
        fn id(&self) -> Cow<'_, str> {
            Cow::Borrowed("flow-1")
        }

        fn pause_reading(&self) -> Result<(), ReadControlError> {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn resume_reading(&self) -> Result<(), ReadControlError> {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BareTransport;

    impl Transport for BareTransport {}

    fn gate() -> WriteGate {
        WriteGate::with_config(
            Arc::new(InlineScheduler::new()),
            WriteGateConfig::new().with_label("unit"),
        )
    }

    #[test]
    #[traced_test]
    fn lifecycle_transitions_are_logged() {
        let gate = gate();
        gate.connection_made(Arc::new(FlowTransport::default()));
        gate.pause_writing();
        gate.resume_writing();
        gate.connection_lost(None);

        assert!(logs_contain("connection made"));
        assert!(logs_contain("flow-1"));
        assert!(logs_contain("writing paused"));
        assert!(logs_contain("writing resumed"));
        assert!(logs_contain("connection lost"));
    }

    #[test]
    #[traced_test]
    fn second_concurrent_producer_is_rejected() {
        let gate = gate();
        gate.connection_made(Arc::new(BareTransport));
        gate.pause_writing();

        let mut first = Box::pin(gate.await_drain());
        assert!(first.as_mut().now_or_never().is_none());
        assert!(gate.has_pending_drain());

        let second = gate.await_drain().now_or_never();
        assert!(matches!(second, Some(Err(DrainError::ConcurrentDrain))));
        assert!(logs_contain("another producer is already waiting"));
        assert!(gate.has_pending_drain(), "rejected caller must not disturb the slot");

        gate.resume_writing();
        assert!(matches!(first.as_mut().now_or_never(), Some(Ok(()))));
        assert!(!gate.has_pending_drain());
    }

    #[test]
    #[traced_test]
    fn dropping_a_pending_drain_vacates_the_slot() {
        let gate = gate();
        gate.connection_made(Arc::new(BareTransport));
        gate.pause_writing();

        let mut pending = Box::pin(gate.await_drain());
        assert!(pending.as_mut().now_or_never().is_none());
        drop(pending);

        assert!(!gate.has_pending_drain());
        assert!(logs_contain("drain wait cancelled"));
        gate.resume_writing();
        assert!(!logs_contain("drain waiter already settled"), "slot was already vacated");
    }

    #[test]
    fn read_flow_control_forwards_only_on_change() {
        let gate = gate();
        let transport = Arc::new(FlowTransport::default());

        gate.pause_reading();
        assert!(!gate.is_reading_paused(), "no transport attached yet");

        gate.connection_made(transport.clone());
        gate.pause_reading();
        gate.pause_reading();
        assert!(gate.is_reading_paused());
        assert_eq!(transport.pauses.load(Ordering::SeqCst), 1);

        gate.resume_reading();
        gate.resume_reading();
        assert!(!gate.is_reading_paused());
        assert_eq!(transport.resumes.load(Ordering::SeqCst), 1);

        gate.pause_reading();
        gate.connection_lost(None);
        gate.resume_reading();
        assert!(gate.is_reading_paused(), "detached transport cannot be resumed");
        assert_eq!(transport.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn unsupported_read_hooks_do_not_fail_the_gate() {
        let gate = gate();
        gate.connection_made(Arc::new(BareTransport));

        gate.pause_reading();
        assert!(gate.is_reading_paused());
        assert!(logs_contain("transport ignored pause_reading"));

        gate.resume_reading();
        assert!(!gate.is_reading_paused());
        assert!(logs_contain("transport ignored resume_reading"));
    }

    #[test]
    fn debug_output_reflects_state() {
        let gate = gate();
        gate.connection_made(Arc::new(FlowTransport::default()));
        gate.pause_writing();
        let rendered = format!("{gate:?}");
        assert!(rendered.contains("flow-1"));
        assert!(rendered.contains("paused: true"));
        assert!(rendered.contains("\"unit\""));
    }
}
