use std::borrow::Cow;

use serde::Deserialize;

const DEFAULT_LABEL: &str = "write-gate";
const DEFAULT_RESET_MESSAGE: &str = "Connection lost";

/// 闸门级配置项。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 宿主通常以 TOML 描述连接处理器，本结构可直接嵌入其中反序列化；
/// - `label` 出现在每条日志的 `gate` 字段中，用于在同一进程内区分多条连接的闸门。
///
/// ## 契约说明（What）
/// - `with_label`：设置日志标签；
/// - `with_reset_message`：设置连接丢失后 `await_drain` 返回的
///   [`DrainError::ConnectionReset`](crate::DrainError::ConnectionReset) 文案；
/// - 缺省字段在反序列化时回落到 [`WriteGateConfig::default`]。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WriteGateConfig {
    label: Cow<'static, str>,
    reset_message: Cow<'static, str>,
}

impl WriteGateConfig {
    /// 创建默认配置。
    pub const fn new() -> Self {
        Self {
            label: Cow::Borrowed(DEFAULT_LABEL),
            reset_message: Cow::Borrowed(DEFAULT_RESET_MESSAGE),
        }
    }

    /// 设置日志标签。
    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }

    /// 设置连接重置错误的文案。
    pub fn with_reset_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.reset_message = message.into();
        self
    }

    /// 读取日志标签。
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 读取连接重置错误的文案。
    pub fn reset_message(&self) -> &str {
        &self.reset_message
    }

    pub(crate) fn reset_message_owned(&self) -> Cow<'static, str> {
        self.reset_message.clone()
    }
}

impl Default for WriteGateConfig {
    fn default() -> Self {
        Self::new()
    }
}
