//! 错误类型
//!
//! - `ConfigError`: 字段注册表或配置文件问题，启动时即失败
//! - `ValidationError`: 提交前发现的查询状态问题，本地恢复，状态不变
//! - `QueryError`: 对外统一的错误类型，涵盖网络错误和后端错误

use thiserror::Error;

/// 配置错误（重复字段、缺失字段、配置文件无法解析等）
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "配置错误: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// 提交前的校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("条件行不存在: {0}")]
    UnknownRow(u32),
    #[error("未知字段: {0}")]
    UnknownField(String),
    #[error("条件行 {row} 的输入控件不支持该操作 (当前: {shape})")]
    InputShapeMismatch { row: u32, shape: &'static str },
    #[error("请输入数字: {0}")]
    InvalidNumber(String),
    #[error("字段 {field} 没有选项 {option}")]
    UnknownOption { field: String, option: String },
    #[error("请选择统计指标")]
    MissingMetric,
    #[error("请选择分组")]
    MissingGroup,
    #[error("请选择统计指标或分组")]
    MissingMetricOrGroup,
    #[error("请选择报表模板或添加组合查询条件")]
    EmptyReport,
    #[error("页码必须从 1 开始")]
    InvalidPage,
    #[error("上一个请求仍在进行中")]
    RequestInFlight,
}

/// 对外统一的错误类型
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("请求失败{}: {message}", status_suffix(.status))]
    Network { status: Option<u16>, message: String },
    #[error("后端错误: {0}")]
    Backend(String),
    #[error("响应数据格式错误: {0}")]
    Decode(#[from] serde_json::Error),
}

impl QueryError {
    pub fn network(message: impl Into<String>) -> Self {
        QueryError::Network { status: None, message: message.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_display() {
        let err = QueryError::Network { status: Some(502), message: "bad gateway".to_string() };
        assert_eq!(err.to_string(), "请求失败 (HTTP 502): bad gateway");

        let err = QueryError::network("connection refused");
        assert_eq!(err.to_string(), "请求失败: connection refused");
    }

    #[test]
    fn test_validation_converts() {
        let err: QueryError = ValidationError::MissingMetricOrGroup.into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "请选择统计指标或分组");
    }

    #[test]
    fn test_config_error_display() {
        let err: QueryError = ConfigError::new("重复字段: age".to_string()).into();
        assert_eq!(err.to_string(), "配置错误: 重复字段: age");
    }
}
