//! 字段注册表
//!
//! 注册表在启动时加载一次，之后只读。条件构建器和参数组装器都通过引用使用它，
//! 字段的声明顺序决定了字段下拉框的选项顺序和结果表格的列顺序。

use crate::catalog;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// 字段的取值类型，决定条件行中值输入控件的形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "dropdown")]
    Dropdown,
    #[serde(rename = "number_range")]
    NumberRange,
    #[serde(rename = "multi-select")]
    MultiSelect,
    #[serde(rename = "checkbox")]
    Boolean,
}

impl ValueKind {
    /// 该类型是否带有固定选项
    pub fn has_options(self) -> bool {
        matches!(self, ValueKind::Dropdown | ValueKind::MultiSelect)
    }

    /// 该类型的运算符是否固定为 `=`
    pub fn fixed_operator(self) -> bool {
        matches!(self, ValueKind::NumberRange | ValueKind::MultiSelect | ValueKind::Boolean)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Dropdown => "dropdown",
            ValueKind::NumberRange => "number_range",
            ValueKind::MultiSelect => "multi-select",
            ValueKind::Boolean => "checkbox",
        }
    }
}

/// 可查询字段的描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub value_kind: ValueKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FieldSpec {
    pub fn new(key: &str, label: &str, value_kind: ValueKind) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            value_kind,
            options: Vec::new(),
        }
    }

    pub fn with_options<I, S>(key: &str, label: &str, value_kind: ValueKind, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            value_kind,
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// 查找不到字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFound(pub String);

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "字段不存在: {}", self.0)
    }
}

impl std::error::Error for NotFound {}

/// 只读的字段注册表
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl FieldRegistry {
    /// 从字段列表构建注册表，发现重复或不合法的字段定义时返回配置错误
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(fields.len());

        for (position, spec) in fields.iter().enumerate() {
            validate_spec(spec)?;
            if index.insert(spec.key.clone(), position).is_some() {
                return Err(ConfigError::new(format!("重复的字段键: {}", spec.key)));
            }
        }

        Ok(Self { fields, index })
    }

    /// 内置字段目录
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::new(catalog::builtin_fields())
    }

    /// 从JSON文件加载字段目录
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        let content = fs::read_to_string(path_ref).map_err(|e| {
            ConfigError::new(format!("无法读取字段目录 {}: {}", path_ref.display(), e))
        })?;

        Self::from_json_str(&content).map_err(|e| {
            ConfigError::new(format!("{} ({})", e.message, path_ref.display()))
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let fields: Vec<FieldSpec> = serde_json::from_str(content)
            .map_err(|e| ConfigError::new(format!("无法解析字段目录: {}", e)))?;
        Self::new(fields)
    }

    pub fn lookup(&self, key: &str) -> Result<&FieldSpec, NotFound> {
        self.index
            .get(key)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| NotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// 按声明顺序返回所有字段
    pub fn all(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 字段的显示名称，未知字段原样返回键名
    pub fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.lookup(key).map(|f| f.label.as_str()).unwrap_or(key)
    }
}

fn validate_spec(spec: &FieldSpec) -> Result<(), ConfigError> {
    if spec.key.trim().is_empty() {
        return Err(ConfigError::new(format!("字段键为空 (标签: {})", spec.label)));
    }

    if spec.value_kind.has_options() {
        if spec.options.is_empty() {
            return Err(ConfigError::new(format!(
                "字段 {} 的类型为 {}，但没有配置选项",
                spec.key,
                spec.value_kind.as_str()
            )));
        }
        let mut seen = HashSet::new();
        for option in &spec.options {
            if !seen.insert(option.as_str()) {
                return Err(ConfigError::new(format!("字段 {} 的选项重复: {}", spec.key, option)));
            }
        }
    } else if !spec.options.is_empty() {
        return Err(ConfigError::new(format!(
            "字段 {} 的类型为 {}，不应配置选项",
            spec.key,
            spec.value_kind.as_str()
        )));
    }

    Ok(())
}
