// ============================================================================
// AgentSched - 请求数据模型
// ============================================================================
//
// 文件: src/models/request.rs
// 职责: 监控请求、结果以及结果输出接口定义
// 边界:
//   - ✅ 请求与结果数据结构定义
//   - ✅ 结果写入 trait 定义
//   - ✅ 监控项键解析
//   - ❌ 不应包含任务调度逻辑
//   - ❌ 不应包含插件实现
//
// ============================================================================

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, SchedulerError};

/// 监控请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// 监控项ID（0 表示直接请求，不缓存）
    #[serde(default)]
    pub itemid: u64,
    /// 监控项键
    pub key: String,
    /// 检查间隔
    #[serde(default)]
    pub delay: String,
}

impl Request {
    pub fn new(itemid: u64, key: impl Into<String>, delay: impl Into<String>) -> Self {
        Self { itemid, key: key.into(), delay: delay.into() }
    }

    /// 创建直接请求
    pub fn direct(key: impl Into<String>) -> Self {
        Self::new(0, key, "")
    }
}

/// 采集结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResult {
    pub itemid: u64,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ts: DateTime<Utc>,
}

impl AgentResult {
    pub fn value(request: &Request, value: Option<String>, ts: DateTime<Utc>) -> Self {
        Self { itemid: request.itemid, key: request.key.clone(), value, error: None, ts }
    }

    pub fn error(request: &Request, error: impl ToString, ts: DateTime<Utc>) -> Self {
        Self {
            itemid: request.itemid,
            key: request.key.clone(),
            value: None,
            error: Some(error.to_string()),
            ts,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// 结果输出接口
///
/// 由工作线程并发调用，实现必须自行保证线程安全。
pub trait ResultWriter: Send + Sync {
    fn write(&self, result: AgentResult);
}

/// 结果输出共享引用
pub type SinkRef = Arc<dyn ResultWriter>;

/// 基于 tokio 通道的结果输出
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<AgentResult>,
}

impl ChannelWriter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResultWriter for ChannelWriter {
    fn write(&self, result: AgentResult) {
        if self.tx.send(result).is_err() {
            debug!("result receiver closed, dropping result");
        }
    }
}

fn metric_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("static pattern"))
}

/// 解析监控项键，返回指标名称和参数列表
///
/// 支持 `name`、`name[]`、`name[a,b]` 以及带引号的参数 `name["a,b",c]`。
pub fn parse_key(key: &str) -> Result<(String, Vec<String>)> {
    let (name, rest) = match key.find('[') {
        Some(pos) => (&key[..pos], Some(&key[pos + 1..])),
        None => (key, None),
    };

    if !metric_name_pattern().is_match(name) {
        return Err(SchedulerError::invalid_key(key, "invalid metric name"));
    }

    let params = match rest {
        None => Vec::new(),
        Some(rest) => {
            let body = rest
                .strip_suffix(']')
                .ok_or_else(|| SchedulerError::invalid_key(key, "missing closing bracket"))?;
            parse_params(key, body)?
        }
    };

    Ok((name.to_string(), params))
}

fn parse_params(key: &str, body: &str) -> Result<Vec<String>> {
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let mut params = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    // 参数开头的空格会被忽略
    let mut at_start = true;

    while let Some(c) = chars.next() {
        match c {
            ' ' if at_start => {}
            '"' if at_start => {
                at_start = false;
                let mut closed = false;
                while let Some(q) = chars.next() {
                    match q {
                        '\\' if chars.peek() == Some(&'"') => {
                            current.push('"');
                            chars.next();
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => current.push(other),
                    }
                }
                if !closed {
                    return Err(SchedulerError::invalid_key(key, "unterminated quoted parameter"));
                }
                while chars.peek() == Some(&' ') {
                    chars.next();
                }
                match chars.peek() {
                    None | Some(',') => {}
                    Some(_) => {
                        return Err(SchedulerError::invalid_key(
                            key,
                            "unexpected character after quoted parameter",
                        ))
                    }
                }
            }
            ',' => {
                params.push(std::mem::take(&mut current));
                at_start = true;
            }
            '[' | ']' => {
                return Err(SchedulerError::invalid_key(key, "nested brackets are not supported"));
            }
            other => {
                at_start = false;
                current.push(other);
            }
        }
    }
    params.push(current);

    Ok(params)
}
