//! 交互命令语言的 token 定义

/// 一个 token 及其在输入中的位置
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // 字面量
    Word(&'a str),   // 命令名、字段键、未加引号的值
    Str(&'a str),    // 双引号内的内容，不含引号
    Number(&'a str), // 数字保持原文，按字符串发送
    RowRef(u32),     // #3

    // 比较运算符
    Eq,    // =
    NotEq, // !=
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=

    // 标点
    DotDot,    // ..
    Comma,     // ,
    Semicolon, // ;

    Illegal, // 无法识别的字符或未闭合的字符串
}

impl TokenKind<'_> {
    /// 可以作为值使用的 token 的文本
    pub fn value_text(&self) -> Option<&str> {
        match self {
            TokenKind::Word(s) | TokenKind::Str(s) | TokenKind::Number(s) => Some(*s),
            _ => None,
        }
    }
}

/// 输入中的字节区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
