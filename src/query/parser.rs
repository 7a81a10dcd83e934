//! 查询文本的递归下降解析器
//!
//! 优先级从高到低为：否定 `-`、并列（与）、`+`（或）。

use super::{Expr, MetaKey, MetaPredicate};
use crate::error::{QueryError, SyntaxError};
use crate::pattern::Pattern;

/// 括号的最大嵌套层数
const MAX_DEPTH: usize = 128;

const OPERAND: &[&str] = &["tag", "metatag", "'('", "'-'"];
const VALUE: &[&str] = &["'\"'", "'/'", "value"];

/// 解析一条查询
pub fn parse(text: &str) -> Result<Expr> {
    Parser::new(text).parse()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

type Result<T> = std::result::Result<T, QueryError>;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_value_char(c: char) -> bool {
    is_word_char(c) || matches!(c, '.' | '*' | '?' | '-')
}

impl Parser {
    fn new(text: &str) -> Self {
        Self { chars: text.chars().collect(), pos: 0, depth: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, position: usize, message: impl Into<String>) -> QueryError {
        SyntaxError::new(position, message).into()
    }

    fn error_expecting(
        &self,
        position: usize,
        message: impl Into<String>,
        expected: &[&'static str],
    ) -> QueryError {
        SyntaxError::new(position, message).expecting(expected).into()
    }

    fn parse(mut self) -> Result<Expr> {
        self.skip_whitespace();
        if self.peek().is_none() {
            return Err(self.error_expecting(self.pos, "empty query", OPERAND));
        }
        let expr = self.parse_or()?;
        self.skip_whitespace();
        match self.peek() {
            None => Ok(expr),
            Some(')') => Err(self.error(self.pos, "unbalanced parentheses: unexpected ')'")),
            Some(c) => Err(self.error_expecting(
                self.pos,
                format!("unexpected character '{}'", c),
                OPERAND,
            )),
        }
    }

    /// or := and ('+' and)*
    fn parse_or(&mut self) -> Result<Expr> {
        let mut parts = vec![self.parse_and()?];
        loop {
            self.skip_whitespace();
            if self.peek() != Some('+') {
                break;
            }
            let plus = self.pos;
            self.advance();
            self.skip_whitespace();
            if matches!(self.peek(), None | Some('+') | Some(')')) {
                return Err(self.error_expecting(plus, "dangling '+'", OPERAND));
            }
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expr::Or(parts) })
    }

    /// and := unary+
    fn parse_and(&mut self) -> Result<Expr> {
        let mut parts = vec![];
        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some('+') | Some(')') => break,
                _ => parts.push(self.parse_unary()?),
            }
        }
        match parts.len() {
            0 => {
                let message = match self.peek() {
                    Some('+') => "dangling '+'",
                    _ => "expected an operand",
                };
                Err(self.error_expecting(self.pos, message, OPERAND))
            }
            1 => Ok(parts.remove(0)),
            _ => Ok(Expr::And(parts)),
        }
    }

    /// unary := '-' unary | primary
    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() != Some('-') {
            return self.parse_primary();
        }
        let start = self.pos;
        self.advance();
        match self.peek() {
            None | Some('+') | Some(')') => {
                Err(self.error_expecting(start, "dangling '-'", OPERAND))
            }
            Some(c) if c.is_whitespace() => {
                Err(self.error_expecting(start, "dangling '-'", OPERAND))
            }
            _ => {
                // 连续的否定和括号共用嵌套层数
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(self.error(start, "negation nested too deeply"));
                }
                let inner = self.parse_unary()?;
                self.depth -= 1;
                Ok(Expr::not(inner))
            }
        }
    }

    /// primary := '(' or ')' | tag | metatag
    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some('(') => self.parse_group(),
            Some(c) if is_word_char(c) => self.parse_word(),
            Some(c) => Err(self.error_expecting(
                self.pos,
                format!("unexpected character '{}'", c),
                OPERAND,
            )),
            None => Err(self.error_expecting(self.pos, "unexpected end of query", OPERAND)),
        }
    }

    fn parse_group(&mut self) -> Result<Expr> {
        let start = self.pos;
        self.advance();
        self.skip_whitespace();
        match self.peek() {
            Some(')') => return Err(self.error_expecting(start, "empty group", OPERAND)),
            None => {
                return Err(self.error_expecting(
                    start,
                    "unbalanced parentheses: '(' is never closed",
                    &["')'"],
                ));
            }
            _ => {}
        }

        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(start, "parentheses nested too deeply"));
        }
        let expr = self.parse_or()?;
        self.depth -= 1;

        self.skip_whitespace();
        if self.advance() != Some(')') {
            return Err(self.error_expecting(
                start,
                "unbalanced parentheses: '(' is never closed",
                &["')'"],
            ));
        }
        Ok(expr)
    }

    /// 读取一个单词，后面紧跟 `:` 时作为元标签的键
    fn parse_word(&mut self) -> Result<Expr> {
        let start = self.pos;
        while self.peek().is_some_and(is_word_char) {
            self.pos += 1;
        }
        let word = self.chars[start..self.pos].iter().collect::<String>();

        let after_word = self.pos;
        self.skip_whitespace();
        if self.peek() != Some(':') {
            self.pos = after_word;
            return Ok(Expr::Atom(word));
        }

        let Some(key) = MetaKey::from_keyword(&word) else {
            return Err(self.error_expecting(
                start,
                format!("unknown metatag '{}'", word),
                MetaKey::KEYWORDS,
            ));
        };
        self.advance();
        self.skip_whitespace();
        let pattern = self.parse_value(key)?;
        Ok(Expr::Meta(MetaPredicate { key, pattern }))
    }

    fn parse_value(&mut self, key: MetaKey) -> Result<Pattern> {
        let case_insensitive = key.case_insensitive();
        match self.peek() {
            Some('"') => {
                let source = self.read_delimited('"', "unterminated quoted value")?;
                Ok(Pattern::glob(&source, case_insensitive)?)
            }
            Some('/') => {
                let source = self.read_delimited('/', "unterminated regular expression")?;
                Ok(Pattern::regex(&source, case_insensitive)?)
            }
            Some(c) if is_value_char(c) => {
                let start = self.pos;
                while self.peek().is_some_and(is_value_char) {
                    self.pos += 1;
                }
                let source = self.chars[start..self.pos].iter().collect::<String>();
                Ok(Pattern::glob(&source, case_insensitive)?)
            }
            _ => Err(self.error_expecting(
                self.pos,
                format!("missing value for metatag '{}'", key.keyword()),
                VALUE,
            )),
        }
    }

    /// 读取定界符之间的原始文本，转义序列原样保留，交给匹配器处理
    fn read_delimited(&mut self, delimiter: char, message: &str) -> Result<String> {
        let start = self.pos;
        self.advance();
        let mut source = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(self.error_expecting(
                        start,
                        message,
                        &[if delimiter == '"' { "'\"'" } else { "'/'" }],
                    ));
                }
                Some(c) if c == delimiter => return Ok(source),
                Some('\\') => {
                    source.push('\\');
                    if let Some(next) = self.advance() {
                        source.push(next);
                    }
                }
                Some(c) => source.push(c),
            }
        }
    }
}
