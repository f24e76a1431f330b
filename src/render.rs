//! 后端响应类型与结果展示
//!
//! 只负责把后端返回的 JSON 解析成类型化的结果，并整理成可直接输出的文本单元格，
//! 不关心最终由什么界面显示。

use crate::field::FieldRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub type Record = Map<String, Value>;

/// 报表数据行的列顺序，`*_ratio` 列按百分比显示
pub const REPORT_COLUMNS: [&str; 10] = [
    "row_name",
    "pre_clinic_count",
    "pre_clinic_ratio",
    "mild_count",
    "mild_ratio",
    "moderate_count",
    "moderate_ratio",
    "bad_vision_count",
    "bad_vision_ratio",
    "total_count",
];

/// 学生查询结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableResult {
    #[serde(default)]
    pub students: Vec<Record>,
    #[serde(default)]
    pub total: u64,
}

/// 表头单元格：普通文本或带合并信息的单元格
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderCell {
    Text(String),
    Span {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        colspan: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rowspan: Option<u32>,
    },
}

impl HeaderCell {
    pub fn text(&self) -> &str {
        match self {
            HeaderCell::Text(text) => text,
            HeaderCell::Span { text, .. } => text,
        }
    }

    pub fn colspan(&self) -> u32 {
        match self {
            HeaderCell::Span { colspan: Some(n), .. } => *n,
            _ => 1,
        }
    }

    pub fn rowspan(&self) -> u32 {
        match self {
            HeaderCell::Span { rowspan: Some(n), .. } => *n,
            _ => 1,
        }
    }
}

/// 报表表头，兼容多层、单层和单个字符串三种返回形式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportHeader {
    Nested(Vec<Vec<HeaderCell>>),
    Flat(Vec<HeaderCell>),
    Single(String),
}

impl Default for ReportHeader {
    fn default() -> Self {
        ReportHeader::Nested(Vec::new())
    }
}

impl ReportHeader {
    /// 统一成多层表头
    pub fn rows(&self) -> Vec<Vec<HeaderCell>> {
        match self {
            ReportHeader::Nested(rows) => rows.clone(),
            ReportHeader::Flat(cells) => vec![cells.clone()],
            ReportHeader::Single(text) => vec![vec![HeaderCell::Text(text.clone())]],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportRow {
    Record(Record),
    Cells(Vec<Value>),
}

/// 统计报表结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    #[serde(default)]
    pub header: ReportHeader,
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(rename = "tableName", default)]
    pub table_name: Option<String>,
    #[serde(rename = "filterAnnotation", default)]
    pub filter_annotation: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl ReportResult {
    /// 逐行整理成文本单元格
    pub fn render_rows(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(render_report_row).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataset {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub data: Vec<f64>,
    #[serde(rename = "backgroundColor", default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Value>,
}

/// 图表数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<ChartDataset>,
}

impl fmt::Display for ChartResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.labels.join(" | "))?;
        for dataset in &self.datasets {
            let values: Vec<String> = dataset.data.iter().map(|v| v.to_string()).collect();
            writeln!(f, "{}: {}", dataset.label, values.join(", "))?;
        }
        Ok(())
    }
}

/// 侧边栏菜单项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sub_menu: Vec<MenuItem>,
}

/// 数值保留两位小数并加 `%`，非数值原样输出
pub fn format_ratio(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(v) => format!("{:.2}%", v),
            None => n.to_string(),
        },
        other => cell_text(other),
    }
}

pub fn total_pages(total: u64, per_page: u32) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(u64::from(per_page))
}

/// 自定义名称优先，否则使用后端返回的表名
pub fn report_title(custom_name: Option<&str>, table_name: Option<&str>) -> String {
    custom_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or(table_name)
        .unwrap_or_default()
        .to_string()
}

pub fn stat_time_annotation(stat_time: Option<&str>) -> String {
    match stat_time.map(str::trim) {
        Some(time) if !time.is_empty() => format!("统计时间：{}", time),
        _ => String::new(),
    }
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "是".to_string(),
        Value::Bool(false) => "否".to_string(),
        other => other.to_string(),
    }
}

fn render_report_row(row: &ReportRow) -> Vec<String> {
    match row {
        ReportRow::Record(record) => REPORT_COLUMNS
            .iter()
            .map(|column| match record.get(*column) {
                Some(value) if column.ends_with("_ratio") => format_ratio(value),
                Some(value) if !value.is_null() => cell_text(value),
                // 缺失的计数列显示 0
                _ if column.ends_with("_count") => "0".to_string(),
                _ => String::new(),
            })
            .collect(),
        ReportRow::Cells(cells) => cells.iter().map(cell_text).collect(),
    }
}

/// 学生查询结果按列投影后的表格
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    /// 表头使用字段的显示名称，未登记的列直接显示键名
    pub fn project(students: &[Record], columns: &[String], registry: &FieldRegistry) -> Self {
        let headers = columns
            .iter()
            .map(|column| registry.label(column).to_string())
            .collect();
        let rows = students
            .iter()
            .map(|student| {
                columns
                    .iter()
                    .map(|column| student.get(column).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }
}

impl fmt::Display for TableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.headers.join("\t"))?;
        for row in &self.rows {
            writeln!(f, "{}", row.join("\t"))?;
        }
        Ok(())
    }
}
