//! 配置模块，负责加载JSON配置文件

use crate::assembler::{AssemblerConfig, DEFAULT_CONDITIONS_PARAM};
use crate::error::ConfigError;
use crate::field::FieldRegistry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "vision_query.json";

/// 客户端配置，文件中缺省的项取默认值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 后端服务地址
    pub base_url: String,
    pub per_page: u32,
    /// 组合查询条件的参数名，旧版后端使用 `combo_conditions`
    pub conditions_param: String,
    pub require_report_roles: bool,
    /// 自定义字段目录，未设置时使用内置字段
    pub registry_path: Option<PathBuf>,
    pub timeout_secs: u64,
    /// 未设置 RUST_LOG 时使用的日志级别
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            per_page: 10,
            conditions_param: DEFAULT_CONDITIONS_PARAM.to_string(),
            require_report_roles: true,
            registry_path: None,
            timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::new(format!("配置文件不存在: {}", path_ref.display())));
        }

        let content = fs::read_to_string(path_ref).map_err(|e| {
            ConfigError::new(format!("无法读取配置文件 {}: {}", path_ref.display(), e))
        })?;

        let config: ClientConfig = serde_json::from_str(&content).map_err(|e| {
            ConfigError::new(format!("无法解析JSON配置文件 {}: {}", path_ref.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 文件不存在时使用默认配置，文件存在但内容有误时报错
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_json_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.per_page == 0 {
            return Err(ConfigError::new("per_page 必须大于 0".to_string()));
        }
        if self.conditions_param.trim().is_empty() {
            return Err(ConfigError::new("conditions_param 不能为空".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::new("timeout_secs 必须大于 0".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            conditions_param: self.conditions_param.clone(),
            require_report_roles: self.require_report_roles,
        }
    }

    /// 加载字段注册表，相对路径按当前工作目录解析
    pub fn load_registry(&self) -> Result<FieldRegistry, ConfigError> {
        match &self.registry_path {
            Some(path) => FieldRegistry::from_json_file(path),
            None => FieldRegistry::builtin(),
        }
    }
}
