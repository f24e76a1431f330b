//! 交互命令的语法分析器
//!
//! 一行输入可以包含多条命令，以分号分隔：
//!
//! ```text
//! add; field #1 age; range #1 6..12; search
//! ```
//!
//! ## 命令一览
//!
//! ```text
//! 条件行       add | remove #n | clear | show | fields [关键字]
//!              field #n <字段键>
//!              role  #n metric|group|filter|none
//!              op    #n like|=|!=|>|<|>=|<=|none
//!              text  #n <值>
//!              range #n [最小值]..[最大值]
//!              check #n <选项>[, <选项>...] | uncheck #n <选项>[, ...]
//!              toggle #n <选项>
//!              flag  #n on|off
//! 查询状态     fixed <字段键> [值] | sort [字段] [asc|desc] | page <n> | perpage <n>
//!              template [名称] | stat [统计时间] | title [报表名称]
//!              chart <分组字段> <统计指标> | columns <列>[, <列>...]
//! 视图与提交   view table|report|chart | params | search | export
//!              import <文件路径> [数据年份] | menu | reset | help | quit
//! ```
//!
//! 值可以是未加引号的词、数字或双引号字符串；省略可选参数表示清除该项。

use crate::assembler::{SortOrder, ViewKind};
use crate::builder::RowId;
use crate::condition::{ConditionRole, Operator};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add,
    Field { row: RowId, key: String },
    Role { row: RowId, role: Option<ConditionRole> },
    Op { row: RowId, operator: Option<Operator> },
    Text { row: RowId, value: String },
    Range { row: RowId, min: Option<String>, max: Option<String> },
    Check { row: RowId, options: Vec<String>, checked: bool },
    Toggle { row: RowId, option: String },
    Flag { row: RowId, checked: bool },
    Remove { row: RowId },
    Clear,
    Show,
    Fields { keyword: Option<String> },
    Fixed { key: String, value: Option<String> },
    Sort { field: Option<String>, order: Option<SortOrder> },
    Page(u32),
    PerPage(u32),
    Template(Option<String>),
    StatTime(Option<String>),
    Title(Option<String>),
    Chart { group_by: String, metric: String },
    Columns(Vec<String>),
    View(ViewKind),
    Params,
    Search,
    Export,
    Import { path: PathBuf, data_year: Option<String> },
    Menu,
    Reset,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self { message, span: Some(span) }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{} (位置 {}-{})", self.message, span.start, span.end),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// 解析一行输入
pub fn parse_line(input: &str) -> Result<Vec<Command>, ParseError> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    CommandParser::new(&tokens).parse()
}

pub struct CommandParser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
}

impl<'a> CommandParser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self { tokens, position: 0 }
    }

    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// 当前命令是否已结束（分号或输入结束）
    fn at_command_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token { kind: TokenKind::Semicolon, .. }))
    }

    fn end_span(&self) -> Option<Span> {
        self.tokens.last().map(|t| Span::new(t.span.end, t.span.end))
    }

    pub fn parse(&mut self) -> Result<Vec<Command>, ParseError> {
        let mut commands = Vec::new();

        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Semicolon {
                self.advance();
                continue;
            }
            commands.push(self.parse_command()?);

            match self.peek() {
                None => break,
                Some(Token { kind: TokenKind::Semicolon, .. }) => {
                    self.advance();
                }
                Some(token) => {
                    return Err(ParseError::at_position(
                        format!("多余的参数: {:?}", token.kind),
                        token.span,
                    ));
                }
            }
        }

        Ok(commands)
    }

    fn parse_command(&mut self) -> Result<Command, ParseError> {
        let (name, span) = match self.advance() {
            Some(Token { kind: TokenKind::Word(name), span }) => (name.to_ascii_lowercase(), *span),
            Some(token) => {
                return Err(ParseError::at_position(
                    format!("期望命令名，实际为 {:?}", token.kind),
                    token.span,
                ))
            }
            None => return Err(ParseError::new("期望命令名".to_string(), self.end_span())),
        };

        let command = match name.as_str() {
            "add" => Command::Add,
            "field" => {
                let row = self.expect_row()?;
                Command::Field { row, key: self.expect_value("字段键")? }
            }
            "role" => {
                let row = self.expect_row()?;
                let role = match self.optional_value()? {
                    None => None,
                    Some(v) if v.eq_ignore_ascii_case("none") => None,
                    Some(v) => Some(v.parse::<ConditionRole>().map_err(|e| self.error_before(e.message))?),
                };
                Command::Role { row, role }
            }
            "op" => {
                let row = self.expect_row()?;
                Command::Op { row, operator: self.parse_operator()? }
            }
            "text" => {
                let row = self.expect_row()?;
                Command::Text { row, value: self.optional_value()?.unwrap_or_default() }
            }
            "range" => {
                let row = self.expect_row()?;
                let (min, max) = self.parse_range()?;
                Command::Range { row, min, max }
            }
            "check" | "uncheck" => {
                let row = self.expect_row()?;
                let options = self.value_list("选项")?;
                Command::Check { row, options, checked: name == "check" }
            }
            "toggle" => {
                let row = self.expect_row()?;
                Command::Toggle { row, option: self.expect_value("选项")? }
            }
            "flag" => {
                let row = self.expect_row()?;
                let value = self.expect_value("on 或 off")?;
                let checked = match value.to_ascii_lowercase().as_str() {
                    "on" | "true" | "yes" | "1" | "是" => true,
                    "off" | "false" | "no" | "0" | "否" => false,
                    _ => return Err(self.error_before(format!("无效的复选框取值: {}", value))),
                };
                Command::Flag { row, checked }
            }
            "remove" => Command::Remove { row: self.expect_row()? },
            "clear" => Command::Clear,
            "show" => Command::Show,
            "fields" => Command::Fields { keyword: self.optional_value()? },
            "fixed" => {
                let key = self.expect_value("字段键")?;
                Command::Fixed { key, value: self.optional_value()? }
            }
            "sort" => self.parse_sort()?,
            "page" => Command::Page(self.expect_number("页码")?),
            "perpage" | "per_page" => Command::PerPage(self.expect_number("每页条数")?),
            "template" => Command::Template(self.optional_value()?),
            "stat" => Command::StatTime(self.optional_value()?),
            "title" => Command::Title(self.optional_value()?),
            "chart" => {
                let group_by = self.expect_value("分组字段")?;
                Command::Chart { group_by, metric: self.expect_value("统计指标")? }
            }
            "columns" => Command::Columns(self.value_list("列名")?),
            "view" => {
                let value = self.expect_value("视图名称")?;
                Command::View(value.parse::<ViewKind>().map_err(|e| self.error_before(e))?)
            }
            "params" => Command::Params,
            "search" => Command::Search,
            "export" => Command::Export,
            "import" => {
                let path = PathBuf::from(self.expect_value("文件路径")?);
                Command::Import { path, data_year: self.optional_value()? }
            }
            "menu" => Command::Menu,
            "reset" => Command::Reset,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(ParseError::at_position(format!("未知命令: {}", other), span)),
        };
        Ok(command)
    }

    /// 指向上一个 token 的错误
    fn error_before(&self, message: String) -> ParseError {
        let span = self
            .position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span);
        ParseError::new(message, span)
    }

    fn expect_row(&mut self) -> Result<RowId, ParseError> {
        match self.peek() {
            Some(Token { kind: TokenKind::RowRef(n), .. }) => {
                let row = RowId(*n);
                self.advance();
                Ok(row)
            }
            Some(token) => Err(ParseError::at_position(
                format!("期望条件行编号 (#n)，实际为 {:?}", token.kind),
                token.span,
            )),
            None => Err(ParseError::new("期望条件行编号 (#n)".to_string(), self.end_span())),
        }
    }

    fn optional_value(&mut self) -> Result<Option<String>, ParseError> {
        if self.at_command_end() {
            return Ok(None);
        }
        self.expect_value("值").map(Some)
    }

    fn expect_value(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(token) => match token.kind.value_text() {
                Some(text) => {
                    let text = text.to_string();
                    self.advance();
                    Ok(text)
                }
                None => Err(ParseError::at_position(
                    format!("期望{}，实际为 {:?}", what, token.kind),
                    token.span,
                )),
            },
            None => Err(ParseError::new(format!("缺少{}", what), self.end_span())),
        }
    }

    fn expect_number(&mut self, what: &str) -> Result<u32, ParseError> {
        let value = self.expect_value(what)?;
        value
            .parse::<u32>()
            .map_err(|_| self.error_before(format!("{}必须是非负整数: {}", what, value)))
    }

    /// 逗号分隔的值列表，至少一项
    fn value_list(&mut self, what: &str) -> Result<Vec<String>, ParseError> {
        let mut values = vec![self.expect_value(what)?];
        while let Some(Token { kind: TokenKind::Comma, .. }) = self.peek() {
            self.advance();
            values.push(self.expect_value(what)?);
        }
        Ok(values)
    }

    fn parse_operator(&mut self) -> Result<Option<Operator>, ParseError> {
        let Some(token) = self.peek() else {
            return Ok(None);
        };
        let operator = match &token.kind {
            TokenKind::Semicolon => return Ok(None),
            TokenKind::Eq => Some(Operator::Eq),
            TokenKind::NotEq => Some(Operator::NotEq),
            TokenKind::Gt => Some(Operator::Gt),
            TokenKind::Lt => Some(Operator::Lt),
            TokenKind::Gte => Some(Operator::Gte),
            TokenKind::Lte => Some(Operator::Lte),
            TokenKind::Word(w) if w.eq_ignore_ascii_case("none") => None,
            TokenKind::Word(w) => Some(
                w.parse::<Operator>()
                    .map_err(|e| ParseError::at_position(e.message, token.span))?,
            ),
            other => {
                return Err(ParseError::at_position(
                    format!("期望运算符，实际为 {:?}", other),
                    token.span,
                ))
            }
        };
        self.advance();
        Ok(operator)
    }

    /// `[min]..[max]`，也接受单个值表示只设置最小值
    fn parse_range(&mut self) -> Result<(Option<String>, Option<String>), ParseError> {
        let min = match self.peek() {
            Some(Token { kind: TokenKind::DotDot, .. }) => None,
            _ if self.at_command_end() => return Ok((None, None)),
            _ => Some(self.expect_value("最小值")?),
        };
        let max = match self.peek() {
            Some(Token { kind: TokenKind::DotDot, .. }) => {
                self.advance();
                if self.at_command_end() {
                    None
                } else {
                    Some(self.expect_value("最大值")?)
                }
            }
            _ => None,
        };
        Ok((min, max))
    }

    fn parse_sort(&mut self) -> Result<Command, ParseError> {
        let mut field = None;
        let mut order = None;
        while !self.at_command_end() {
            let value = self.expect_value("排序字段或方向")?;
            match value.parse::<SortOrder>() {
                Ok(o) => order = Some(o),
                Err(_) if field.is_none() => field = Some(value),
                Err(e) => return Err(self.error_before(e)),
            }
        }
        Ok(Command::Sort { field, order })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &str) -> Command {
        let mut commands = parse_line(input).unwrap();
        assert_eq!(commands.len(), 1, "{:?}", commands);
        commands.remove(0)
    }

    #[test]
    fn test_multiple_commands() {
        let commands = parse_line("add; field #1 age; range #1 6..12; search").unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Add,
                Command::Field { row: RowId(1), key: "age".to_string() },
                Command::Range { row: RowId(1), min: Some("6".to_string()), max: Some("12".to_string()) },
                Command::Search,
            ]
        );
    }

    #[test]
    fn test_empty_input_and_stray_semicolons() {
        assert!(parse_line("").unwrap().is_empty());
        assert!(parse_line("  ;; ").unwrap().is_empty());
        assert_eq!(parse_line(";show;").unwrap(), vec![Command::Show]);
    }

    #[test]
    fn test_open_ranges() {
        assert_eq!(
            parse_one("range #2 ..12"),
            Command::Range { row: RowId(2), min: None, max: Some("12".to_string()) }
        );
        assert_eq!(
            parse_one("range #2 -0.5.."),
            Command::Range { row: RowId(2), min: Some("-0.5".to_string()), max: None }
        );
        assert_eq!(parse_one("range #2"), Command::Range { row: RowId(2), min: None, max: None });
    }

    #[test]
    fn test_operators() {
        assert_eq!(parse_one("op #1 >="), Command::Op { row: RowId(1), operator: Some(Operator::Gte) });
        assert_eq!(parse_one("op #1 LIKE"), Command::Op { row: RowId(1), operator: Some(Operator::Like) });
        assert_eq!(parse_one("op #1 none"), Command::Op { row: RowId(1), operator: None });
        assert!(parse_line("op #1 contains").is_err());
    }

    #[test]
    fn test_roles() {
        assert_eq!(parse_one("role #3 metric"), Command::Role { row: RowId(3), role: Some(ConditionRole::Metric) });
        assert_eq!(parse_one("role #3 分组"), Command::Role { row: RowId(3), role: Some(ConditionRole::Group) });
        assert_eq!(parse_one("role #3"), Command::Role { row: RowId(3), role: None });
    }

    #[test]
    fn test_option_lists() {
        assert_eq!(
            parse_one("check #2 上升, 维持"),
            Command::Check {
                row: RowId(2),
                options: vec!["上升".to_string(), "维持".to_string()],
                checked: true,
            }
        );
        assert_eq!(
            parse_one("uncheck #2 下降"),
            Command::Check { row: RowId(2), options: vec!["下降".to_string()], checked: false }
        );
        assert_eq!(parse_one("flag #4 on"), Command::Flag { row: RowId(4), checked: true });
        assert!(parse_line("flag #4 maybe").is_err());
    }

    #[test]
    fn test_query_state_commands() {
        assert_eq!(
            parse_one(r#"fixed name "张 三""#),
            Command::Fixed { key: "name".to_string(), value: Some("张 三".to_string()) }
        );
        assert_eq!(parse_one("fixed school"), Command::Fixed { key: "school".to_string(), value: None });
        assert_eq!(
            parse_one("sort age desc"),
            Command::Sort { field: Some("age".to_string()), order: Some(SortOrder::Desc) }
        );
        assert_eq!(parse_one("sort"), Command::Sort { field: None, order: None });
        assert_eq!(parse_one("page 3"), Command::Page(3));
        assert_eq!(parse_one("template template1"), Command::Template(Some("template1".to_string())));
        assert_eq!(parse_one("stat 2024-09"), Command::StatTime(Some("2024-09".to_string())));
        assert_eq!(parse_one("view report"), Command::View(ViewKind::Report));
        assert_eq!(
            parse_one("columns school, name, age"),
            Command::Columns(vec!["school".to_string(), "name".to_string(), "age".to_string()])
        );
        assert_eq!(
            parse_one("import students.xlsx 2024"),
            Command::Import { path: PathBuf::from("students.xlsx"), data_year: Some("2024".to_string()) }
        );
    }

    #[test]
    fn test_errors_carry_span() {
        let err = parse_line("frobnicate").unwrap_err();
        assert_eq!(err.span, Some(Span::new(0, 10)));

        let err = parse_line("field age").unwrap_err();
        assert_eq!(err.span, Some(Span::new(6, 9)));

        let err = parse_line("field #1").unwrap_err();
        assert_eq!(err.span, Some(Span::new(8, 8)));

        let err = parse_line("page -1").unwrap_err();
        assert!(err.message.contains("页码"));

        let err = parse_line("show extra").unwrap_err();
        assert_eq!(err.span, Some(Span::new(5, 10)));
    }
}
