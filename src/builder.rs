//! 组合查询条件构建器
//!
//! 构建器持有所有条件行的状态，界面只是这份状态的投影（见 [`ConditionBuilder::view`]），
//! 不直接修改条件模型。提交时调用 [`ConditionBuilder::collect`] 得到条件列表。
//!
//! 条件行的生命周期：
//!
//! ```text
//! add_row()            → 新行，字段未选，值输入为默认文本框
//!   select_field()     → 按字段类型替换值输入控件，丢弃旧值
//!   set_role / set_operator / set_text / set_range(_*) / set_option(s)_checked / set_checked
//! remove_row() / clear()
//! collect()            → 跳过不完整或为空的行，生成条件列表
//! ```

use crate::condition::{Condition, ConditionRole, ConditionValue, NumberRange, Operator};
use crate::error::ValidationError;
use crate::field::{FieldRegistry, FieldSpec, ValueKind};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 条件行编号，在同一个构建器内单调递增且不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u32);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 条件行的值输入控件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueInput {
    /// 文本输入框
    Text(String),
    /// 下拉单选框，`selected` 为空表示未选择
    Select { options: Vec<String>, selected: String },
    /// 最小值、最大值两个数值输入框
    Range { min: String, max: String },
    /// 每个选项一个复选框
    Checkboxes(Vec<(String, bool)>),
    /// 单个复选框
    Checkbox(bool),
}

impl ValueInput {
    /// 按字段类型生成初始控件，所有输入均为空、所有复选框均未选中
    pub fn for_field(spec: &FieldSpec) -> Self {
        match spec.value_kind {
            ValueKind::Text => ValueInput::Text(String::new()),
            ValueKind::Dropdown => ValueInput::Select {
                options: spec.options.clone(),
                selected: String::new(),
            },
            ValueKind::NumberRange => ValueInput::Range {
                min: String::new(),
                max: String::new(),
            },
            ValueKind::MultiSelect => {
                ValueInput::Checkboxes(spec.options.iter().map(|o| (o.clone(), false)).collect())
            }
            ValueKind::Boolean => ValueInput::Checkbox(false),
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            ValueInput::Text(_) => "text",
            ValueInput::Select { .. } => "select",
            ValueInput::Range { .. } => "range",
            ValueInput::Checkboxes(_) => "checkboxes",
            ValueInput::Checkbox(_) => "checkbox",
        }
    }

    /// 从控件中读取值，空值返回 `None`
    fn capture(&self) -> Option<ConditionValue> {
        let value = match self {
            ValueInput::Text(s) => ConditionValue::Text(s.trim().to_string()),
            ValueInput::Select { selected, .. } => ConditionValue::Text(selected.trim().to_string()),
            ValueInput::Range { min, max } => {
                ConditionValue::Range(NumberRange::new(Some(min.as_str()), Some(max.as_str())))
            }
            ValueInput::Checkboxes(boxes) => ConditionValue::Options(
                boxes
                    .iter()
                    .filter(|(_, checked)| *checked)
                    .map(|(option, _)| option.clone())
                    .collect(),
            ),
            ValueInput::Checkbox(checked) => ConditionValue::Flag(*checked),
        };
        (!value.is_void()).then_some(value)
    }
}

impl Default for ValueInput {
    fn default() -> Self {
        ValueInput::Text(String::new())
    }
}

/// 一条条件行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionRow {
    pub id: RowId,
    pub role: Option<ConditionRole>,
    pub field: Option<String>,
    pub operator: Option<Operator>,
    pub input: ValueInput,
}

impl ConditionRow {
    fn new(id: RowId) -> Self {
        Self {
            id,
            role: None,
            field: None,
            operator: Some(Operator::ALL[0]),
            input: ValueInput::default(),
        }
    }
}

/// 条件列表的提供者，参数组装器通过它获取条件而不依赖具体的构建器
pub trait ConditionSource {
    fn collect(&self) -> Vec<Condition>;
}

impl ConditionSource for Vec<Condition> {
    fn collect(&self) -> Vec<Condition> {
        self.clone()
    }
}

/// 组合查询条件构建器
#[derive(Debug, Clone)]
pub struct ConditionBuilder {
    registry: Arc<FieldRegistry>,
    rows: Vec<ConditionRow>,
    next_id: u32,
}

impl ConditionBuilder {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self {
            registry,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// 追加一条未选字段的新行
    pub fn add_row(&mut self) -> RowId {
        let id = RowId(self.next_id);
        self.next_id += 1;
        self.rows.push(ConditionRow::new(id));
        id
    }

    /// 为条件行选择字段，并按字段类型替换值输入控件
    ///
    /// 即使新旧字段类型相同，旧值也会被丢弃。
    pub fn select_field(&mut self, row: RowId, key: &str) -> Result<(), ValidationError> {
        let input = {
            let spec = self
                .registry
                .lookup(key)
                .map_err(|e| ValidationError::UnknownField(e.0))?;
            ValueInput::for_field(spec)
        };
        let target = self.row_mut(row)?;
        target.field = Some(key.to_string());
        target.input = input;
        Ok(())
    }

    /// 清空字段选择，恢复默认文本框
    pub fn clear_field(&mut self, row: RowId) -> Result<(), ValidationError> {
        let target = self.row_mut(row)?;
        target.field = None;
        target.input = ValueInput::default();
        Ok(())
    }

    pub fn set_role(&mut self, row: RowId, role: Option<ConditionRole>) -> Result<(), ValidationError> {
        self.row_mut(row)?.role = role;
        Ok(())
    }

    pub fn set_operator(&mut self, row: RowId, operator: Option<Operator>) -> Result<(), ValidationError> {
        self.row_mut(row)?.operator = operator;
        Ok(())
    }

    /// 设置文本框内容或下拉框选中项
    pub fn set_text(&mut self, row: RowId, value: &str) -> Result<(), ValidationError> {
        let field = self.row(row)?.field.clone().unwrap_or_default();
        let target = self.row_mut(row)?;
        match &mut target.input {
            ValueInput::Text(text) => {
                *text = value.to_string();
                Ok(())
            }
            ValueInput::Select { options, selected } => {
                if !value.is_empty() && !options.iter().any(|o| o == value) {
                    return Err(ValidationError::UnknownOption {
                        field,
                        option: value.to_string(),
                    });
                }
                *selected = value.to_string();
                Ok(())
            }
            other => Err(ValidationError::InputShapeMismatch { row: row.0, shape: other.shape() }),
        }
    }

    /// 设置区间最小值，只接受数字或空字符串
    pub fn set_range_min(&mut self, row: RowId, value: &str) -> Result<(), ValidationError> {
        check_number(value)?;
        self.edit_range(row, |min, _| *min = value.trim().to_string())
    }

    pub fn set_range_max(&mut self, row: RowId, value: &str) -> Result<(), ValidationError> {
        check_number(value)?;
        self.edit_range(row, |_, max| *max = value.trim().to_string())
    }

    /// 同时设置区间两端，任一端不是数字时两端都不修改
    pub fn set_range(&mut self, row: RowId, min: &str, max: &str) -> Result<(), ValidationError> {
        check_number(min)?;
        check_number(max)?;
        self.edit_range(row, |lo, hi| {
            *lo = min.trim().to_string();
            *hi = max.trim().to_string();
        })
    }

    fn edit_range(
        &mut self,
        row: RowId,
        edit: impl FnOnce(&mut String, &mut String),
    ) -> Result<(), ValidationError> {
        match &mut self.row_mut(row)?.input {
            ValueInput::Range { min, max } => {
                edit(min, max);
                Ok(())
            }
            other => Err(ValidationError::InputShapeMismatch { row: row.0, shape: other.shape() }),
        }
    }

    /// 勾选或取消多选框中的某个选项
    pub fn set_option_checked(
        &mut self,
        row: RowId,
        option: &str,
        checked: bool,
    ) -> Result<(), ValidationError> {
        let field = self.row(row)?.field.clone().unwrap_or_default();
        match &mut self.row_mut(row)?.input {
            ValueInput::Checkboxes(boxes) => {
                let slot = boxes
                    .iter_mut()
                    .find(|(o, _)| o == option)
                    .ok_or_else(|| ValidationError::UnknownOption {
                        field,
                        option: option.to_string(),
                    })?;
                slot.1 = checked;
                Ok(())
            }
            other => Err(ValidationError::InputShapeMismatch { row: row.0, shape: other.shape() }),
        }
    }

    /// 批量勾选或取消，有一个选项不存在时不做任何修改
    pub fn set_options_checked<S: AsRef<str>>(
        &mut self,
        row: RowId,
        options: &[S],
        checked: bool,
    ) -> Result<(), ValidationError> {
        let field = self.row(row)?.field.clone().unwrap_or_default();
        match &mut self.row_mut(row)?.input {
            ValueInput::Checkboxes(boxes) => {
                for option in options {
                    let option = option.as_ref();
                    if !boxes.iter().any(|(o, _)| o == option) {
                        return Err(ValidationError::UnknownOption {
                            field,
                            option: option.to_string(),
                        });
                    }
                }
                for (o, value) in boxes.iter_mut() {
                    if options.iter().any(|option| option.as_ref() == o.as_str()) {
                        *value = checked;
                    }
                }
                Ok(())
            }
            other => Err(ValidationError::InputShapeMismatch { row: row.0, shape: other.shape() }),
        }
    }

    pub fn toggle_option(&mut self, row: RowId, option: &str) -> Result<bool, ValidationError> {
        let current = match &self.row(row)?.input {
            ValueInput::Checkboxes(boxes) => boxes.iter().any(|(o, checked)| o == option && *checked),
            other => {
                return Err(ValidationError::InputShapeMismatch { row: row.0, shape: other.shape() })
            }
        };
        self.set_option_checked(row, option, !current)?;
        Ok(!current)
    }

    pub fn set_checked(&mut self, row: RowId, checked: bool) -> Result<(), ValidationError> {
        match &mut self.row_mut(row)?.input {
            ValueInput::Checkbox(value) => {
                *value = checked;
                Ok(())
            }
            other => Err(ValidationError::InputShapeMismatch { row: row.0, shape: other.shape() }),
        }
    }

    /// 删除条件行，已收集的条件不受影响
    pub fn remove_row(&mut self, row: RowId) -> Result<(), ValidationError> {
        let position = self.position(row)?;
        self.rows.remove(position);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn rows(&self) -> &[ConditionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, row: RowId) -> Result<&ConditionRow, ValidationError> {
        self.rows
            .iter()
            .find(|r| r.id == row)
            .ok_or(ValidationError::UnknownRow(row.0))
    }

    fn row_mut(&mut self, row: RowId) -> Result<&mut ConditionRow, ValidationError> {
        self.rows
            .iter_mut()
            .find(|r| r.id == row)
            .ok_or(ValidationError::UnknownRow(row.0))
    }

    fn position(&self, row: RowId) -> Result<usize, ValidationError> {
        self.rows
            .iter()
            .position(|r| r.id == row)
            .ok_or(ValidationError::UnknownRow(row.0))
    }

    /// 界面投影：每行的字段定义、角色、运算符和当前值输入
    pub fn view(&self) -> Vec<RowView<'_>> {
        self.rows
            .iter()
            .map(|row| RowView {
                id: row.id,
                role: row.role,
                field: row.field.as_deref().and_then(|k| self.registry.lookup(k).ok()),
                operator: row.operator,
                input: &row.input,
            })
            .collect()
    }

    fn collect_row(&self, row: &ConditionRow) -> Option<Condition> {
        let key = row.field.as_deref().filter(|k| !k.trim().is_empty())?;
        let operator = row.operator?;
        let spec = self.registry.lookup(key).ok()?;

        let Some(value) = row.input.capture() else {
            debug!(row = row.id.0, field = key, "跳过值为空的条件行");
            return None;
        };

        let operator = if spec.value_kind.fixed_operator() { Operator::Eq } else { operator };

        Some(Condition {
            field: key.to_string(),
            role: row.role.unwrap_or_default(),
            operator,
            value,
        })
    }
}

impl ConditionSource for ConditionBuilder {
    /// 按行顺序收集完整的条件
    fn collect(&self) -> Vec<Condition> {
        self.rows.iter().filter_map(|row| self.collect_row(row)).collect()
    }
}

fn check_number(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() || value.parse::<f64>().is_ok_and(f64::is_finite) {
        Ok(())
    } else {
        Err(ValidationError::InvalidNumber(value.to_string()))
    }
}

/// 条件行的只读投影
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    pub id: RowId,
    pub role: Option<ConditionRole>,
    pub field: Option<&'a FieldSpec>,
    pub operator: Option<Operator>,
    pub input: &'a ValueInput,
}

impl fmt::Display for RowView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.id)?;
        match self.role {
            Some(role) => write!(f, "[{}] ", role.label())?,
            None => write!(f, "[选择角色] ")?,
        }
        match self.field {
            Some(spec) => write!(f, "{}({}) ", spec.label, spec.key)?,
            None => write!(f, "<选择字段> ")?,
        }
        match self.operator {
            Some(op) => write!(f, "{} ", op)?,
            None => write!(f, "<运算符> ")?,
        }
        match self.input {
            ValueInput::Text(s) if s.is_empty() => write!(f, "<输入查询值>"),
            ValueInput::Text(s) => write!(f, "\"{}\"", s),
            ValueInput::Select { selected, .. } if selected.is_empty() => write!(f, "<请选择>"),
            ValueInput::Select { selected, .. } => write!(f, "{}", selected),
            ValueInput::Range { min, max } => write!(
                f,
                "[{} ~ {}]",
                if min.is_empty() { "最小值" } else { min },
                if max.is_empty() { "最大值" } else { max }
            ),
            ValueInput::Checkboxes(boxes) => {
                let items: Vec<String> = boxes
                    .iter()
                    .map(|(o, checked)| format!("[{}]{}", if *checked { "x" } else { " " }, o))
                    .collect();
                write!(f, "{}", items.join(" "))
            }
            ValueInput::Checkbox(checked) => write!(f, "[{}]选中", if *checked { "x" } else { " " }),
        }
    }
}
