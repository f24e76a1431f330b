//! 查询参数组装器
//!
//! 把固定查询字段、组合查询条件、模板、分页和排序合并成一组有序的请求参数。
//! 表格、报表、图表三个视图使用同一个组装器，参数顺序固定：
//!
//! ```text
//! 固定字段(白名单顺序) → stat_time → advanced_conditions | template → group_by, metric
//!   → page, per_page | export, columns → sort_field, sort_order
//! ```
//!
//! 组装过程是纯函数：相同的输入总是得到相同的参数。

use crate::builder::ConditionSource;
use crate::condition::{serialize_conditions, Condition, ConditionRole};
use crate::error::{ConfigError, QueryError, ValidationError};
use crate::field::FieldRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// 固定查询字段白名单
pub const FIXED_FIELDS: [&str; 8] = [
    "education_id",
    "school",
    "grade",
    "class_name",
    "data_year",
    "name",
    "gender",
    "id_card",
];

pub const DEFAULT_CONDITIONS_PARAM: &str = "advanced_conditions";
pub const LEGACY_CONDITIONS_PARAM: &str = "combo_conditions";

/// 查询所服务的视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Table,
    Report,
    Chart,
}

impl ViewKind {
    /// 报表和图表视图发送条件角色，并允许使用模板
    pub fn is_analysis(self) -> bool {
        matches!(self, ViewKind::Report | ViewKind::Chart)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Table => "table",
            ViewKind::Report => "report",
            ViewKind::Chart => "chart",
        }
    }
}

impl FromStr for ViewKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" | "query" => Ok(ViewKind::Table),
            "report" => Ok(ViewKind::Report),
            "chart" => Ok(ViewKind::Chart),
            other => Err(format!("未知视图: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("未知排序方向: {}", other)),
        }
    }
}

/// 排序字段和方向相互独立，各自存在时才发送
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    pub field: Option<String>,
    pub order: Option<SortOrder>,
}

/// 图表的分组维度和统计指标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartAxes {
    pub group_by: String,
    pub metric: String,
}

impl Default for ChartAxes {
    fn default() -> Self {
        Self {
            group_by: "school".to_string(),
            metric: "left_interv_effect".to_string(),
        }
    }
}

/// 导出模式：不分页，可选择导出的列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub columns: Vec<String>,
}

/// 一个视图的查询状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState {
    pub fixed: HashMap<String, String>,
    pub conditions: Vec<Condition>,
    pub sort: Sort,
    /// 从 1 开始
    pub page: u32,
    pub per_page: u32,
    pub template: Option<String>,
    pub stat_time: Option<String>,
    pub chart: Option<ChartAxes>,
    pub export: Option<ExportOptions>,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            fixed: HashMap::new(),
            conditions: Vec::new(),
            sort: Sort::default(),
            page: 1,
            per_page: 10,
            template: None,
            stat_time: None,
            chart: None,
            export: None,
        }
    }
}

impl QueryState {
    pub fn with_page(page: u32, per_page: u32) -> Self {
        Self { page, per_page, ..Self::default() }
    }

    pub fn set_fixed(&mut self, key: &str, value: &str) {
        if value.trim().is_empty() {
            self.fixed.remove(key);
        } else {
            self.fixed.insert(key.to_string(), value.to_string());
        }
    }

    /// 清空固定字段、条件、模板等用户输入，回到第一页
    pub fn reset(&mut self) {
        let per_page = self.per_page;
        *self = Self { per_page, ..Self::default() };
    }
}

/// 有序的请求参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.pairs.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// URL 编码后的查询字符串
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// 组装器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// 组合查询条件的参数名
    pub conditions_param: String,
    /// 自定义报表必须同时包含统计指标和分组
    pub require_report_roles: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            conditions_param: DEFAULT_CONDITIONS_PARAM.to_string(),
            require_report_roles: true,
        }
    }
}

#[derive(Clone)]
pub struct Assembler {
    registry: Arc<FieldRegistry>,
    config: AssemblerConfig,
}

impl Assembler {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self::with_config(registry, AssemblerConfig::default())
    }

    pub fn with_config(registry: Arc<FieldRegistry>, config: AssemblerConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// 从条件提供者收集条件后组装参数，`state` 中原有的条件被替换
    pub fn assemble(
        &self,
        view: ViewKind,
        state: &QueryState,
        source: &dyn ConditionSource,
    ) -> Result<QueryParams, QueryError> {
        let state = QueryState {
            conditions: source.collect(),
            ..state.clone()
        };
        self.build(view, &state)
    }

    /// 组装请求参数
    pub fn build(&self, view: ViewKind, state: &QueryState) -> Result<QueryParams, QueryError> {
        if state.export.is_none() && state.page == 0 {
            return Err(ValidationError::InvalidPage.into());
        }
        if view == ViewKind::Report {
            self.validate_report(state)?;
        }

        let mut params = QueryParams::new();
        let conditions = &state.conditions;

        // 1. 固定字段；分析视图中与组合条件重名的字段以组合条件为准
        for key in FIXED_FIELDS {
            let Some(value) = state.fixed.get(key).map(|v| v.trim()) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            if view.is_analysis() && conditions.iter().any(|c| c.field == key) {
                debug!(field = key, "固定字段被组合查询条件覆盖");
                continue;
            }
            params.push(key, value);
        }

        if view == ViewKind::Report {
            if let Some(stat_time) = non_empty(&state.stat_time) {
                params.push("stat_time", stat_time);
            }
        }

        // 2. 组合条件与模板互斥，条件优先
        if !conditions.is_empty() {
            params.push(
                &self.config.conditions_param,
                serialize_conditions(conditions, view.is_analysis()),
            );
        } else if view.is_analysis() {
            if let Some(template) = non_empty(&state.template) {
                params.push("template", template);
            }
        }

        if view == ViewKind::Chart {
            let axes = state.chart.clone().unwrap_or_default();
            params.push("group_by", axes.group_by);
            params.push("metric", axes.metric);
        }

        // 3. 分页或导出
        match &state.export {
            Some(export) => {
                params.push("export", "1");
                if !export.columns.is_empty() {
                    params.push("columns", export.columns.join(","));
                }
            }
            None => {
                params.push("page", state.page.to_string());
                params.push("per_page", state.per_page.to_string());
            }
        }

        // 4. 排序
        if let Some(field) = non_empty(&state.sort.field) {
            params.push("sort_field", field);
        }
        if let Some(order) = state.sort.order {
            params.push("sort_order", order.as_str());
        }

        debug!(view = view.as_str(), params = %params, "组装查询参数");
        Ok(params)
    }

    /// 报表请求的提交前校验
    pub fn validate_report(&self, state: &QueryState) -> Result<(), QueryError> {
        let conditions = &state.conditions;

        for condition in conditions {
            if matches!(condition.role, ConditionRole::Metric | ConditionRole::Group)
                && !self.registry.contains(&condition.field)
            {
                return Err(ConfigError::new(format!(
                    "{}引用了未知字段: {}",
                    condition.role.label(),
                    condition.field
                ))
                .into());
            }
        }

        if !self.config.require_report_roles {
            return Ok(());
        }

        if conditions.is_empty() {
            if non_empty(&state.template).is_none() {
                return Err(ValidationError::EmptyReport.into());
            }
            return Ok(());
        }

        let has_metric = conditions.iter().any(|c| c.role == ConditionRole::Metric);
        let has_group = conditions.iter().any(|c| c.role == ConditionRole::Group);
        match (has_metric, has_group) {
            (true, true) => Ok(()),
            (false, false) => Err(ValidationError::MissingMetricOrGroup.into()),
            (false, true) => Err(ValidationError::MissingMetric.into()),
            (true, false) => Err(ValidationError::MissingGroup.into()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConditionBuilder;
    use crate::condition::{ConditionValue, NumberRange, Operator};
    use proptest::prelude::*;

    fn registry() -> Arc<FieldRegistry> {
        Arc::new(FieldRegistry::builtin().unwrap())
    }

    fn assembler() -> Assembler {
        Assembler::new(registry())
    }

    fn metric_and_group() -> Vec<Condition> {
        vec![
            Condition::new(
                "left_interv_effect",
                Operator::Eq,
                ConditionValue::Options(vec!["上升".to_string()]),
            )
            .with_role(ConditionRole::Metric),
            Condition::new("school", Operator::Eq, ConditionValue::Text("华兴小学".to_string()))
                .with_role(ConditionRole::Group),
        ]
    }

    #[test]
    fn test_fixed_field_with_paging() {
        let mut state = QueryState::with_page(1, 10);
        state.set_fixed("school", "华兴小学");

        let params = assembler().build(ViewKind::Table, &state).unwrap();
        assert_eq!(params.to_string(), "school=华兴小学&page=1&per_page=10");
        assert!(!params.contains("advanced_conditions"));
        assert!(!params.contains("combo_conditions"));
    }

    #[test]
    fn test_query_string_is_url_encoded() {
        let mut state = QueryState::default();
        state.set_fixed("name", "张 三");
        let params = assembler().build(ViewKind::Table, &state).unwrap();
        assert_eq!(params.to_query_string(), "name=%E5%BC%A0+%E4%B8%89&page=1&per_page=10");
    }

    #[test]
    fn test_fixed_fields_follow_whitelist_order_and_skip_blank() {
        let mut state = QueryState::default();
        state.fixed.insert("gender".to_string(), "男".to_string());
        state.fixed.insert("education_id".to_string(), " E001 ".to_string());
        state.fixed.insert("grade".to_string(), "   ".to_string());
        state.fixed.insert("phone".to_string(), "123".to_string());

        let params = assembler().build(ViewKind::Table, &state).unwrap();
        assert_eq!(params.to_string(), "education_id=E001&gender=男&page=1&per_page=10");
    }

    #[test]
    fn test_table_conditions_are_additive_without_roles() {
        let mut state = QueryState::default();
        state.set_fixed("school", "华兴小学");
        state.conditions = vec![Condition::new(
            "school",
            Operator::Eq,
            ConditionValue::Text("苏宁红军小学".to_string()),
        )];

        let params = assembler().build(ViewKind::Table, &state).unwrap();
        assert_eq!(params.get("school"), Some("华兴小学"));
        assert_eq!(
            params.get("advanced_conditions"),
            Some(r#"[{"field":"school","operator":"=","value":"苏宁红军小学"}]"#)
        );
    }

    #[test]
    fn test_report_conditions_override_fixed_field() {
        let mut state = QueryState::default();
        state.set_fixed("school", "华兴小学");
        state.set_fixed("grade", "三年级");
        state.conditions = metric_and_group();

        let params = assembler().build(ViewKind::Report, &state).unwrap();
        assert!(!params.contains("school"));
        assert_eq!(params.get("grade"), Some("三年级"));
    }

    #[test]
    fn test_report_template_without_conditions() {
        let mut state = QueryState::default();
        state.template = Some("template1".to_string());

        let params = assembler().build(ViewKind::Report, &state).unwrap();
        assert_eq!(params.get("template"), Some("template1"));
        assert!(!params.contains("advanced_conditions"));
    }

    #[test]
    fn test_report_with_metric_and_group() {
        let mut state = QueryState::default();
        state.conditions = metric_and_group();
        state.template = Some("template2".to_string());

        let params = assembler().build(ViewKind::Report, &state).unwrap();
        let encoded = params.get("advanced_conditions").unwrap();
        assert!(encoded.contains(r#""role":"metric""#));
        assert!(encoded.contains(r#""role":"group""#));
        assert!(!params.contains("template"));
    }

    #[test]
    fn test_report_without_metric_rejected() {
        let mut state = QueryState::default();
        state.conditions = vec![Condition::new(
            "school",
            Operator::Eq,
            ConditionValue::Text("华兴小学".to_string()),
        )
        .with_role(ConditionRole::Group)];

        let err = assembler().build(ViewKind::Report, &state).unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::MissingMetric)));

        state.conditions[0].role = ConditionRole::Filter;
        let err = assembler().build(ViewKind::Report, &state).unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::MissingMetricOrGroup)));

        state.conditions[0].role = ConditionRole::Metric;
        let err = assembler().build(ViewKind::Report, &state).unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::MissingGroup)));
    }

    #[test]
    fn test_report_role_check_can_be_disabled() {
        let config = AssemblerConfig { require_report_roles: false, ..AssemblerConfig::default() };
        let assembler = Assembler::with_config(registry(), config);

        let mut state = QueryState::default();
        state.conditions = vec![Condition::new("guasha", Operator::Eq, ConditionValue::Flag(true))];
        assert!(assembler.build(ViewKind::Report, &state).is_ok());
        assert!(assembler.build(ViewKind::Report, &QueryState::default()).is_ok());
    }

    #[test]
    fn test_empty_report_rejected() {
        let err = assembler().build(ViewKind::Report, &QueryState::default()).unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::EmptyReport)));
    }

    #[test]
    fn test_unknown_metric_field_is_config_error() {
        let mut state = QueryState::default();
        state.conditions = metric_and_group();
        state.conditions[0].field = "左眼视力干预效果".to_string();

        let err = assembler().build(ViewKind::Report, &state).unwrap_err();
        assert!(matches!(err, QueryError::Configuration(_)));
    }

    #[test]
    fn test_export_mode_omits_paging() {
        let mut state = QueryState::default();
        state.page = 3;
        state.export = Some(ExportOptions { columns: vec!["school".to_string(), "name".to_string()] });

        let params = assembler().build(ViewKind::Table, &state).unwrap();
        assert_eq!(params.get("export"), Some("1"));
        assert_eq!(params.get("columns"), Some("school,name"));
        assert!(!params.contains("page"));
        assert!(!params.contains("per_page"));
    }

    #[test]
    fn test_sort_attached_independently() {
        let mut state = QueryState::default();
        state.sort.order = Some(SortOrder::Desc);
        let params = assembler().build(ViewKind::Table, &state).unwrap();
        assert_eq!(params.get("sort_order"), Some("desc"));
        assert!(!params.contains("sort_field"));

        state.sort.field = Some("age".to_string());
        state.export = Some(ExportOptions::default());
        let params = assembler().build(ViewKind::Table, &state).unwrap();
        assert_eq!(params.to_string(), "export=1&sort_field=age&sort_order=desc");
    }

    #[test]
    fn test_chart_params() {
        let mut state = QueryState::default();
        state.template = Some("template1".to_string());
        state.chart = Some(ChartAxes { group_by: "gender".to_string(), metric: "vision_level".to_string() });

        let params = assembler().build(ViewKind::Chart, &state).unwrap();
        assert_eq!(
            params.to_string(),
            "template=template1&group_by=gender&metric=vision_level&page=1&per_page=10"
        );
    }

    #[test]
    fn test_table_ignores_template() {
        let mut state = QueryState::default();
        state.template = Some("template1".to_string());
        let params = assembler().build(ViewKind::Table, &state).unwrap();
        assert!(!params.contains("template"));
    }

    #[test]
    fn test_legacy_conditions_param() {
        let config = AssemblerConfig {
            conditions_param: LEGACY_CONDITIONS_PARAM.to_string(),
            ..AssemblerConfig::default()
        };
        let assembler = Assembler::with_config(registry(), config);
        let mut state = QueryState::default();
        state.conditions = vec![Condition::new("guasha", Operator::Eq, ConditionValue::Flag(false))];

        let params = assembler.build(ViewKind::Table, &state).unwrap();
        assert!(params.contains("combo_conditions"));
        assert!(!params.contains("advanced_conditions"));
    }

    #[test]
    fn test_page_zero_rejected() {
        let state = QueryState::with_page(0, 10);
        let err = assembler().build(ViewKind::Table, &state).unwrap_err();
        assert!(matches!(err, QueryError::Validation(ValidationError::InvalidPage)));
    }

    #[test]
    fn test_assemble_from_builder() {
        let registry = registry();
        let mut builder = ConditionBuilder::new(registry.clone());
        let row = builder.add_row();
        builder.select_field(row, "age").unwrap();
        builder.set_range_min(row, "6").unwrap();
        builder.set_range_max(row, "12").unwrap();

        let params = Assembler::new(registry)
            .assemble(ViewKind::Table, &QueryState::default(), &builder)
            .unwrap();
        assert_eq!(
            params.get("advanced_conditions"),
            Some(r#"[{"field":"age","operator":"=","value":{"min":"6","max":"12"}}]"#)
        );
    }

    #[test]
    fn test_reset_keeps_page_size() {
        let mut state = QueryState::with_page(4, 20);
        state.set_fixed("school", "华兴小学");
        state.template = Some("template1".to_string());
        state.reset();
        assert_eq!(state, QueryState::with_page(1, 20));
    }

    proptest! {
        #[test]
        fn prop_build_is_idempotent(
            school in proptest::option::of("[\u{4e00}-\u{4e20}]{1,5}"),
            page in 1u32..50,
            per_page in 1u32..100,
            min in "[0-9]{1,2}",
            template in proptest::option::of("template[12]"),
            view in prop_oneof![Just(ViewKind::Table), Just(ViewKind::Chart)],
        ) {
            let mut state = QueryState::with_page(page, per_page);
            if let Some(school) = &school {
                state.set_fixed("school", school);
            }
            state.template = template;
            state.conditions = vec![Condition::new(
                "age",
                Operator::Eq,
                ConditionValue::Range(NumberRange::new(Some(&min), None)),
            )];
            let assembler = assembler();
            let first = assembler.build(view, &state).unwrap();
            let second = assembler.build(view, &state).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert!(!(first.contains("template") && first.contains("advanced_conditions")));
        }
    }
}
