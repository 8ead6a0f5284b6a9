use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

pub(crate) const CONNECTION_RESET_CODE: &str = "spark.transport.write_gate.connection_reset";
pub(crate) const CONNECTION_LOST_CODE: &str = "spark.transport.write_gate.connection_lost";
pub(crate) const CONCURRENT_DRAIN_CODE: &str = "spark.transport.write_gate.concurrent_drain";
pub(crate) const CANCELLED_CODE: &str = "spark.transport.write_gate.cancelled";

/// 传输层上报的连接终止原因。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - `connection_lost` 收到的错误需要原样交给挂起的生产者，`Arc` 包装让同一个错误实例
///   可以同时留在传输侧日志与生产者的返回值中；
/// - 生产者可通过 [`TransportError::same_as`] 确认拿到的正是传输层给出的那一个实例。
///
/// ## 契约 (What)
/// - `Clone` 只复制引用计数，不复制底层错误；
/// - `Display`/`source` 直接委托给内部错误。
#[derive(Clone)]
pub struct TransportError {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl TransportError {
    /// 包装任意传输错误。
    pub fn new(error: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }

    /// 复用已经共享的错误实例。
    pub fn from_arc(inner: Arc<dyn StdError + Send + Sync + 'static>) -> Self {
        Self { inner }
    }

    /// 判断两者是否指向同一个错误实例。
    pub fn same_as(&self, other: &TransportError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 借出底层错误，便于调用方 `downcast_ref`。
    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransportError").field(&self.inner).finish()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        Self::new(value)
    }
}

/// `await_drain` 的失败域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“连接早已失效”“传输层带错断开”“违反单等待者约定”与“等待者被调度器撤销”
///   四类结果，调用方据此决定放弃写入还是上报异常；
/// - **契约 (What)**：每个变体都有稳定错误码（[`DrainError::code`]），并可通过 `From` 转换为
///   [`io::Error`] 以便桥接 `AsyncWrite` 风格的写路径；
/// - **边界 (Trade-offs)**：闸门不做重试，任何重试策略都由生产者自行决定。
#[derive(Debug, Error)]
pub enum DrainError {
    /// 连接已标记丢失后再次请求写入许可。
    #[error("{message}")]
    ConnectionReset { message: Cow<'static, str> },

    /// 等待期间传输层带错断开，错误原样透传。
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] TransportError),

    /// 已有生产者挂起在同一闸门上。
    #[error("another producer is already waiting for drain on this gate")]
    ConcurrentDrain,

    /// 等待者被其调度器撤销。
    #[error("drain waiter was cancelled by its scheduler")]
    Cancelled,
}

impl DrainError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            DrainError::ConnectionReset { .. } => CONNECTION_RESET_CODE,
            DrainError::ConnectionLost(_) => CONNECTION_LOST_CODE,
            DrainError::ConcurrentDrain => CONCURRENT_DRAIN_CODE,
            DrainError::Cancelled => CANCELLED_CODE,
        }
    }

    /// 若错误来自传输层，返回原始错误实例。
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            DrainError::ConnectionLost(err) => Some(err),
            _ => None,
        }
    }

    /// 是否属于连接已失效的失败（包括主动重置与带错断开）。
    pub fn is_connection_gone(&self) -> bool {
        matches!(
            self,
            DrainError::ConnectionReset { .. } | DrainError::ConnectionLost(_)
        )
    }
}

impl From<DrainError> for io::Error {
    fn from(value: DrainError) -> Self {
        let kind = match &value {
            DrainError::ConnectionReset { .. } => io::ErrorKind::ConnectionReset,
            DrainError::ConnectionLost(_) => io::ErrorKind::ConnectionAborted,
            DrainError::ConcurrentDrain => io::ErrorKind::ResourceBusy,
            DrainError::Cancelled => io::ErrorKind::Interrupted,
        };
        io::Error::new(kind, value)
    }
}

/// `Transport::pause_reading`/`resume_reading` 的失败原因。
///
/// 闸门只记录这些错误，不向调用方传播；读侧流控属于尽力而为。
#[derive(Debug, Error)]
pub enum ReadControlError {
    /// 传输实现不支持读侧流控。
    #[error("transport does not support read flow control")]
    Unsupported,

    /// 传输已在关闭流程中。
    #[error("transport is closing")]
    Closing,

    /// 其他传输错误。
    #[error(transparent)]
    Transport(#[from] TransportError),
}
