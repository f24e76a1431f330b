//! 组合查询条件模型及其线上格式
//!
//! 一个条件由字段、角色、运算符和值组成。条件列表在提交时被序列化为 JSON 数组，
//! 作为单个请求参数发送给后端，表格、报表和图表三个视图共用同一格式：
//!
//! ```text
//! [{"field":"age","operator":"=","value":{"min":"6","max":"12"},"role":"filter"}]
//! ```
//!
//! - 文本 / 下拉: `"value": "华兴小学"`
//! - 数值区间: `"value": {"min": "6", "max": ""}`，空字符串表示该侧不设限
//! - 多选: `"value": ["上升", "下降"]`
//! - 复选框: `"value": true`
//! - `role` 只在报表、图表视图中发送

use crate::field::{FieldRegistry, FieldSpec, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "like")]
    Like,
}

impl Operator {
    /// 运算符下拉框中的顺序，第一项为新条件行的默认值
    pub const ALL: [Operator; 7] = [
        Operator::Like,
        Operator::Eq,
        Operator::NotEq,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Like => "like",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DecodeError::new(format!("未知运算符: {}", s)))
    }
}

/// 条件在报表中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionRole {
    /// 统计指标
    Metric,
    /// 分组
    Group,
    /// 筛选
    #[default]
    Filter,
}

impl ConditionRole {
    pub const ALL: [ConditionRole; 3] = [ConditionRole::Metric, ConditionRole::Group, ConditionRole::Filter];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionRole::Metric => "metric",
            ConditionRole::Group => "group",
            ConditionRole::Filter => "filter",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConditionRole::Metric => "统计指标",
            ConditionRole::Group => "分组",
            ConditionRole::Filter => "筛选",
        }
    }
}

impl fmt::Display for ConditionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionRole {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ConditionRole::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s) || role.label() == s)
            .ok_or_else(|| DecodeError::new(format!("未知角色: {}", s)))
    }
}

/// 数值区间，两侧均可缺省
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NumberRange {
    pub min: Option<String>,
    pub max: Option<String>,
}

impl NumberRange {
    pub fn new(min: Option<&str>, max: Option<&str>) -> Self {
        Self {
            min: normalize_bound(min),
            max: normalize_bound(max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

fn normalize_bound(bound: Option<&str>) -> Option<String> {
    bound.map(str::trim).filter(|b| !b.is_empty()).map(str::to_string)
}

/// 条件值，形态由字段的取值类型决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionValue {
    /// 文本输入或下拉单选
    Text(String),
    Range(NumberRange),
    /// 多选，保持选项在字段定义中的顺序
    Options(Vec<String>),
    Flag(bool),
}

impl ConditionValue {
    /// 值为空的条件不会被发送
    pub fn is_void(&self) -> bool {
        match self {
            ConditionValue::Text(s) => s.trim().is_empty(),
            ConditionValue::Range(range) => range.is_empty(),
            ConditionValue::Options(options) => options.is_empty(),
            ConditionValue::Flag(_) => false,
        }
    }

    fn to_wire(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            ConditionValue::Text(s) => Value::String(s.clone()),
            ConditionValue::Range(range) => serde_json::json!({
                "min": range.min.clone().unwrap_or_default(),
                "max": range.max.clone().unwrap_or_default(),
            }),
            ConditionValue::Options(options) => {
                Value::Array(options.iter().cloned().map(Value::String).collect())
            }
            ConditionValue::Flag(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Text(s) => write!(f, "\"{}\"", s),
            ConditionValue::Range(range) => write!(
                f,
                "[{} ~ {}]",
                range.min.as_deref().unwrap_or("-∞"),
                range.max.as_deref().unwrap_or("+∞")
            ),
            ConditionValue::Options(options) => write!(f, "({})", options.join(", ")),
            ConditionValue::Flag(b) => write!(f, "{}", if *b { "是" } else { "否" }),
        }
    }
}

/// 一个完整的组合查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub role: ConditionRole,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(field: &str, operator: Operator, value: ConditionValue) -> Self {
        Self {
            field: field.to_string(),
            role: ConditionRole::default(),
            operator,
            value,
        }
    }

    pub fn with_role(mut self, role: ConditionRole) -> Self {
        self.role = role;
        self
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {} {}", self.role.label(), self.field, self.operator, self.value)
    }
}

/// 条件列表解码错误
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    fn new(message: String) -> Self {
        Self { message }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "条件解析错误: {}", self.message)
    }
}

impl std::error::Error for DecodeError {}

#[derive(Serialize)]
struct WireCondition<'a> {
    field: &'a str,
    operator: Operator,
    value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<ConditionRole>,
}

#[derive(Deserialize)]
struct WireConditionOwned {
    field: String,
    operator: String,
    value: serde_json::Value,
    #[serde(default)]
    role: Option<String>,
}

/// 将条件列表序列化为线上格式的 JSON 字符串
pub fn serialize_conditions(conditions: &[Condition], include_role: bool) -> String {
    let wire: Vec<WireCondition<'_>> = conditions
        .iter()
        .map(|c| WireCondition {
            field: &c.field,
            operator: c.operator,
            value: c.value.to_wire(),
            role: include_role.then_some(c.role),
        })
        .collect();

    // 只含字符串、布尔和数组的结构，序列化不会失败
    serde_json::to_string(&wire).unwrap_or_else(|_| "[]".to_string())
}

/// 从线上格式解析条件列表，值的形态按注册表中的字段类型解释
pub fn deserialize_conditions(
    json: &str,
    registry: &FieldRegistry,
) -> Result<Vec<Condition>, DecodeError> {
    let wire: Vec<WireConditionOwned> = serde_json::from_str(json)
        .map_err(|e| DecodeError::new(format!("无效的 JSON: {}", e)))?;

    wire.into_iter()
        .map(|w| -> Result<Condition, DecodeError> {
            let spec = registry.lookup(&w.field).ok();
            let value = decode_value(&w.field, spec, w.value)?;
            let role = match w.role.as_deref() {
                Some(r) if !r.trim().is_empty() => r.parse()?,
                _ => ConditionRole::default(),
            };
            Ok(Condition {
                field: w.field,
                role,
                operator: w.operator.parse()?,
                value,
            })
        })
        .collect()
}

fn decode_value(
    field: &str,
    spec: Option<&FieldSpec>,
    value: serde_json::Value,
) -> Result<ConditionValue, DecodeError> {
    use serde_json::Value;

    let kind = spec.map(|s| s.value_kind);

    let mismatch = |expected: &str| {
        DecodeError::new(format!("字段 {} 的值应为{}", field, expected))
    };

    match (kind, value) {
        (Some(ValueKind::Text | ValueKind::Dropdown) | None, Value::String(s)) => {
            Ok(ConditionValue::Text(s))
        }
        (Some(ValueKind::Text | ValueKind::Dropdown), Value::Number(n)) => {
            Ok(ConditionValue::Text(n.to_string()))
        }
        (Some(ValueKind::Text | ValueKind::Dropdown), _) => Err(mismatch("字符串")),

        (Some(ValueKind::NumberRange) | None, Value::Object(map)) => {
            let bound = |name: &str| -> Result<Option<String>, DecodeError> {
                match map.get(name) {
                    None | Some(Value::Null) => Ok(None),
                    Some(Value::String(s)) => Ok(normalize_bound(Some(s))),
                    Some(Value::Number(n)) => Ok(Some(n.to_string())),
                    Some(_) => Err(mismatch("数值区间")),
                }
            };
            Ok(ConditionValue::Range(NumberRange {
                min: bound("min")?,
                max: bound("max")?,
            }))
        }
        (Some(ValueKind::NumberRange), _) => Err(mismatch("数值区间")),

        (Some(ValueKind::MultiSelect) | None, Value::Array(items)) => {
            if items.is_empty() {
                return Err(mismatch("非空的字符串数组"));
            }
            let options = items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    _ => Err(mismatch("字符串数组")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            // 未注册的字段无从校验选项
            if let Some(unknown) = spec.and_then(|s| options.iter().find(|o| !s.has_option(o))) {
                return Err(DecodeError::new(format!("字段 {} 没有选项 {}", field, unknown)));
            }
            Ok(ConditionValue::Options(options))
        }
        (Some(ValueKind::MultiSelect), _) => Err(mismatch("字符串数组")),

        (Some(ValueKind::Boolean) | None, Value::Bool(b)) => Ok(ConditionValue::Flag(b)),
        (Some(ValueKind::Boolean), _) => Err(mismatch("布尔值")),

        (None, Value::Number(n)) => Ok(ConditionValue::Text(n.to_string())),
        (None, Value::Null) => Err(mismatch("非空值")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> FieldRegistry {
        FieldRegistry::new(vec![
            FieldSpec::new("name", "姓名", ValueKind::Text),
            FieldSpec::with_options("school", "学校", ValueKind::Dropdown, ["华兴小学", "苏宁红军小学"]),
            FieldSpec::new("age", "年龄", ValueKind::NumberRange),
            FieldSpec::with_options("left_interv_effect", "左眼视力干预效果", ValueKind::MultiSelect, ["上升", "维持", "下降"]),
            FieldSpec::new("guasha", "刮痧", ValueKind::Boolean),
        ])
        .unwrap()
    }

    #[test]
    fn test_serialize_range_condition() {
        let condition = Condition::new(
            "age",
            Operator::Eq,
            ConditionValue::Range(NumberRange::new(Some("6"), Some("12"))),
        );
        let json = serialize_conditions(&[condition], true);
        assert_eq!(
            json,
            r#"[{"field":"age","operator":"=","value":{"min":"6","max":"12"},"role":"filter"}]"#
        );
    }

    #[test]
    fn test_serialize_without_role() {
        let condition = Condition::new("name", Operator::Like, ConditionValue::Text("张".to_string()))
            .with_role(ConditionRole::Metric);
        let json = serialize_conditions(&[condition], false);
        assert_eq!(json, r#"[{"field":"name","operator":"like","value":"张"}]"#);
    }

    #[test]
    fn test_one_sided_range_encodes_empty_string() {
        let condition = Condition::new(
            "age",
            Operator::Eq,
            ConditionValue::Range(NumberRange::new(None, Some("12"))),
        );
        let json = serialize_conditions(&[condition.clone()], true);
        assert!(json.contains(r#""min":"""#));

        let decoded = deserialize_conditions(&json, &test_registry()).unwrap();
        assert_eq!(decoded, vec![condition]);
    }

    #[test]
    fn test_deserialize_backend_payload() {
        let json = r#"[
            {"role": "metric", "field": "left_interv_effect", "operator": "=", "value": ["上升", "下降"]},
            {"role": "group", "field": "school", "operator": "=", "value": "华兴小学"},
            {"role": "", "field": "guasha", "operator": "=", "value": true}
        ]"#;
        let decoded = deserialize_conditions(json, &test_registry()).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].role, ConditionRole::Metric);
        assert_eq!(
            decoded[0].value,
            ConditionValue::Options(vec!["上升".to_string(), "下降".to_string()])
        );
        assert_eq!(decoded[1].role, ConditionRole::Group);
        assert_eq!(decoded[2].role, ConditionRole::Filter);
        assert_eq!(decoded[2].value, ConditionValue::Flag(true));
    }

    #[test]
    fn test_deserialize_kind_mismatch() {
        let json = r#"[{"field": "age", "operator": "=", "value": "6"}]"#;
        assert!(deserialize_conditions(json, &test_registry()).is_err());

        let json = r#"[{"field": "guasha", "operator": "=", "value": "yes"}]"#;
        assert!(deserialize_conditions(json, &test_registry()).is_err());
    }

    #[test]
    fn test_deserialize_rejects_void_or_unlisted_options() {
        let json = r#"[{"field": "left_interv_effect", "operator": "=", "value": []}]"#;
        assert!(deserialize_conditions(json, &test_registry()).is_err());

        let json = r#"[{"field": "left_interv_effect", "operator": "=", "value": ["上升", "消失"]}]"#;
        let err = deserialize_conditions(json, &test_registry()).unwrap_err();
        assert!(err.message.contains("消失"));

        // 未注册字段只做结构解析
        let json = r#"[{"field": "hobbies", "operator": "=", "value": ["跳绳"]}]"#;
        let decoded = deserialize_conditions(json, &test_registry()).unwrap();
        assert_eq!(decoded[0].value, ConditionValue::Options(vec!["跳绳".to_string()]));
    }

    #[test]
    fn test_deserialize_unknown_operator() {
        let json = r#"[{"field": "name", "operator": "~", "value": "x"}]"#;
        let err = deserialize_conditions(json, &test_registry()).unwrap_err();
        assert!(err.message.contains("~"));
    }

    #[test]
    fn test_unknown_field_decoded_structurally() {
        let json = r#"[{"field": "birthday", "operator": ">=", "value": "2015-01-01"},
                       {"field": "left_axis", "operator": "=", "value": {"min": 10, "max": null}}]"#;
        let decoded = deserialize_conditions(json, &test_registry()).unwrap();
        assert_eq!(decoded[0].operator, Operator::Gte);
        assert_eq!(decoded[0].value, ConditionValue::Text("2015-01-01".to_string()));
        assert_eq!(
            decoded[1].value,
            ConditionValue::Range(NumberRange { min: Some("10".to_string()), max: None })
        );
    }

    #[test]
    fn test_operator_and_role_parsing() {
        assert_eq!("LIKE".parse::<Operator>().unwrap(), Operator::Like);
        assert_eq!(" >= ".parse::<Operator>().unwrap(), Operator::Gte);
        assert!("=>".parse::<Operator>().is_err());

        assert_eq!("Metric".parse::<ConditionRole>().unwrap(), ConditionRole::Metric);
        assert_eq!("分组".parse::<ConditionRole>().unwrap(), ConditionRole::Group);
        assert!("total".parse::<ConditionRole>().is_err());
    }

    #[test]
    fn test_void_values() {
        assert!(ConditionValue::Text("  ".to_string()).is_void());
        assert!(ConditionValue::Range(NumberRange::new(Some(""), None)).is_void());
        assert!(ConditionValue::Options(vec![]).is_void());
        assert!(!ConditionValue::Flag(false).is_void());
    }
}
