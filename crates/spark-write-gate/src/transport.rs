use std::borrow::Cow;

use crate::error::ReadControlError;

/// 闸门持有的传输能力句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 闸门只需要“保存/清除传输句柄”，不读写字节；所有方法均带默认实现，
///   任意传输类型只需 `impl Transport for X {}` 即可接入。
///
/// ## 契约说明（What）
/// - `id`：用于日志关联的连接标识；
/// - `pause_reading`/`resume_reading`：读侧流控钩子，默认返回 [`ReadControlError::Unsupported`]；
/// - **前置条件**：传输负责根据自身写缓冲调用闸门的 `pause_writing`/`resume_writing`，
///   并在连接结束时恰好调用一次 `connection_lost`；
/// - **后置条件**：钩子返回错误时闸门仅记录日志，不改变写侧语义。
pub trait Transport: Send + Sync + 'static {
    /// 连接标识。
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed("anonymous")
    }

    /// 暂停从对端读取。
    fn pause_reading(&self) -> Result<(), ReadControlError> {
        Err(ReadControlError::Unsupported)
    }

    /// 恢复从对端读取。
    fn resume_reading(&self) -> Result<(), ReadControlError> {
        Err(ReadControlError::Unsupported)
    }
}
