//! 交互命令的词法分析器

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token { kind, span: Span::new(start, self.position) }
    }

    /// 读取双引号字符串，开始的引号已被消费；没有结束引号时返回 Illegal
    fn read_string(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.peek() {
            if c == '"' {
                let content = &self.input[content_start..self.position];
                self.bump();
                return self.token(TokenKind::Str(content), start);
            }
            self.bump();
        }
        self.token(TokenKind::Illegal, start)
    }

    /// `#` 后跟行号
    fn read_row_ref(&mut self, start: usize) -> Token<'a> {
        let digits_start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        match self.input[digits_start..self.position].parse::<u32>() {
            Ok(n) => self.token(TokenKind::RowRef(n), start),
            Err(_) => self.token(TokenKind::Illegal, start),
        }
    }

    /// 读取一个词，遇到空白、标点或 `..` 为止；能解析为数字的词作为数字
    fn read_word(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || is_punctuation(c) {
                break;
            }
            if c == '.' && self.peek_next() == Some('.') {
                break;
            }
            self.bump();
        }
        let literal = &self.input[start..self.position];
        let kind = if is_number(literal) {
            TokenKind::Number(literal)
        } else {
            TokenKind::Word(literal)
        };
        self.token(kind, start)
    }
}

fn is_punctuation(c: char) -> bool {
    matches!(c, ';' | ',' | '"' | '#' | '=' | '<' | '>' | '!')
}

fn is_number(s: &str) -> bool {
    s.trim_start_matches(['-', '+'])
        .starts_with(|c: char| c.is_ascii_digit())
        && s.parse::<f64>().is_ok()
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let token = match c {
            '=' => self.token(TokenKind::Eq, start),
            ';' => self.token(TokenKind::Semicolon, start),
            ',' => self.token(TokenKind::Comma, start),
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Lte, start)
                } else {
                    self.token(TokenKind::Lt, start)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Gte, start)
                } else {
                    self.token(TokenKind::Gt, start)
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                } else {
                    self.token(TokenKind::Illegal, start)
                }
            }
            '.' if self.peek() == Some('.') => {
                self.bump();
                self.token(TokenKind::DotDot, start)
            }
            '"' => self.read_string(start),
            '#' => self.read_row_ref(start),
            _ => self.read_word(start),
        };
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_command() {
        let mut lexer = Lexer::new("field #1 age");

        assert_eq!(lexer.next().unwrap().kind, TokenKind::Word("field"));
        let row = lexer.next().unwrap();
        assert_eq!(row.kind, TokenKind::RowRef(1));
        assert_eq!(row.span, Span::new(6, 8));
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Word("age"));
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_all_operators_and_punctuation() {
        assert_eq!(
            kinds("!= = > < >= <= .. , ;"),
            vec![
                TokenKind::NotEq, TokenKind::Eq, TokenKind::Gt, TokenKind::Lt,
                TokenKind::Gte, TokenKind::Lte, TokenKind::DotDot, TokenKind::Comma,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_range_literals() {
        assert_eq!(
            kinds("range #2 6..12"),
            vec![
                TokenKind::Word("range"),
                TokenKind::RowRef(2),
                TokenKind::Number("6"),
                TokenKind::DotDot,
                TokenKind::Number("12"),
            ]
        );
        assert_eq!(
            kinds("-0.5.. ..4.25"),
            vec![
                TokenKind::Number("-0.5"),
                TokenKind::DotDot,
                TokenKind::DotDot,
                TokenKind::Number("4.25"),
            ]
        );
    }

    #[test]
    fn test_words_and_strings() {
        assert_eq!(
            kinds(r#"text #1 "张 三"; fixed school 华兴小学; stat 2024-09 1班 inf"#),
            vec![
                TokenKind::Word("text"),
                TokenKind::RowRef(1),
                TokenKind::Str("张 三"),
                TokenKind::Semicolon,
                TokenKind::Word("fixed"),
                TokenKind::Word("school"),
                TokenKind::Word("华兴小学"),
                TokenKind::Semicolon,
                TokenKind::Word("stat"),
                TokenKind::Word("2024-09"),
                TokenKind::Word("1班"),
                TokenKind::Word("inf"),
            ]
        );
    }

    #[test]
    fn test_option_list() {
        assert_eq!(
            kinds("check #3 上升,维持"),
            vec![
                TokenKind::Word("check"),
                TokenKind::RowRef(3),
                TokenKind::Word("上升"),
                TokenKind::Comma,
                TokenKind::Word("维持"),
            ]
        );
    }

    #[test]
    fn test_illegal_input() {
        assert_eq!(kinds(r#"text "open"#), vec![TokenKind::Word("text"), TokenKind::Illegal]);
        assert_eq!(kinds("# !"), vec![TokenKind::Illegal, TokenKind::Illegal]);
    }
}
