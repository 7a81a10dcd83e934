//! 元标签取值的匹配器
//!
//! 双引号中的取值编译为通配符，`*` 匹配任意长度的字符，`?` 匹配恰好一个字符；
//! `/.../` 中的取值直接编译为正则表达式。

use std::fmt;
use std::hash::{Hash, Hasher};

use regex::{Regex, RegexBuilder};

use crate::error::SemanticError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Glob,
    Regex,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    kind: PatternKind,
    /// 书写时的原始文本，不含定界符
    source: String,
    case_insensitive: bool,
    /// 不含通配符的取值，直接比较字符串
    literal: Option<String>,
    regex: Regex,
}

impl Pattern {
    /// 编译通配符，匹配整个字符串
    pub fn glob(source: &str, case_insensitive: bool) -> Result<Self, SemanticError> {
        let mut expr = String::with_capacity(source.len() + 8);
        let mut literal = String::with_capacity(source.len());
        let mut has_wildcard = false;

        let mut chars = source.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some(escaped) => {
                        expr.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                        literal.push(escaped);
                    }
                    None => {
                        return Err(SemanticError::InvalidPattern {
                            detail: format!("dangling escape at the end of \"{}\"", source),
                        });
                    }
                },
                '*' => {
                    has_wildcard = true;
                    expr.push_str(".*");
                }
                '?' => {
                    has_wildcard = true;
                    expr.push('.');
                }
                _ => {
                    expr.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4])));
                    literal.push(ch);
                }
            }
        }

        let regex = build_regex(&format!("^(?s:{})$", expr), case_insensitive)?;
        let literal = match (has_wildcard, case_insensitive) {
            (true, _) => None,
            (false, true) => Some(literal.to_lowercase()),
            (false, false) => Some(literal),
        };

        Ok(Self {
            kind: PatternKind::Glob,
            source: source.to_string(),
            case_insensitive,
            literal,
            regex,
        })
    }

    /// 编译正则表达式，`\/` 转义为 `/`，其余转义原样交给正则引擎
    ///
    /// 与通配符不同，正则表达式不会被锚定，需要时请自行添加 `^` 和 `$`
    pub fn regex(source: &str, case_insensitive: bool) -> Result<Self, SemanticError> {
        let mut expr = String::with_capacity(source.len());
        let mut chars = source.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                match chars.next() {
                    Some('/') => expr.push('/'),
                    Some(next) => {
                        expr.push('\\');
                        expr.push(next);
                    }
                    None => expr.push('\\'),
                }
            } else {
                expr.push(ch);
            }
        }

        let regex = build_regex(&expr, case_insensitive)?;
        Ok(Self {
            kind: PatternKind::Regex,
            source: source.to_string(),
            case_insensitive,
            literal: None,
            regex,
        })
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 是否为不含通配符的字面值
    pub fn is_literal(&self) -> bool {
        self.literal.is_some()
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.literal {
            Some(literal) if self.case_insensitive => text.to_lowercase() == *literal,
            Some(literal) => text == literal,
            None => self.regex.is_match(text),
        }
    }
}

fn build_regex(expr: &str, case_insensitive: bool) -> Result<Regex, SemanticError> {
    RegexBuilder::new(expr)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| SemanticError::InvalidPattern { detail: e.to_string() })
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.case_insensitive == other.case_insensitive
            && self.source == other.source
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.case_insensitive.hash(state);
        self.source.hash(state);
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PatternKind::Glob => write!(f, "\"{}\"", self.source),
            PatternKind::Regex => write!(f, "/{}/", self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("*cat*", "black cat 2", true)]
    #[case("*cat*", "cat", true)]
    #[case("*cat*", "dog", false)]
    #[case("c?t", "cat", true)]
    #[case("c?t", "ct", false)]
    #[case("c?t", "coat", false)]
    #[case("a.b", "a.b", true)]
    #[case("a.b", "axb", false)]
    #[case("x*", "x\ny", true)]
    fn test_glob(#[case] pattern: &str, #[case] text: &str, #[case] expected: bool) {
        let p = Pattern::glob(pattern, false).unwrap();
        assert_eq!(p.is_match(text), expected);
    }

    #[test]
    fn test_glob_escapes() {
        let p = Pattern::glob(r"awesome\ pic", false).unwrap();
        assert!(p.is_literal());
        assert!(p.is_match("awesome pic"));
        assert!(!p.is_match("awesome  pic"));

        let p = Pattern::glob(r"star\*", false).unwrap();
        assert!(p.is_literal());
        assert!(p.is_match("star*"));
        assert!(!p.is_match("stars"));

        let p = Pattern::glob(r#"say \"hi\" \\ \?"#, false).unwrap();
        assert!(p.is_match(r#"say "hi" \ ?"#));
    }

    #[test]
    fn test_glob_dangling_escape() {
        let err = Pattern::glob(r"abc\", false).unwrap_err();
        assert!(matches!(err, SemanticError::InvalidPattern { .. }));
    }

    #[test]
    fn test_glob_case_insensitive() {
        let p = Pattern::glob("JPG", true).unwrap();
        assert!(p.is_match("jpg"));
        assert!(p.is_match("Jpg"));
        assert!(!p.is_match("jpeg"));

        let p = Pattern::glob("jp*", true).unwrap();
        assert!(p.is_match("JPEG"));
    }

    #[test]
    fn test_regex() {
        let p = Pattern::regex(r"^img_\d+$", false).unwrap();
        assert!(p.is_match("img_042"));
        assert!(!p.is_match("img_04a"));

        // 未锚定时按子串搜索
        let p = Pattern::regex(r"\d{4}", false).unwrap();
        assert!(p.is_match("holiday 2019 beach"));
    }

    #[test]
    fn test_regex_slash_escape() {
        let p = Pattern::regex(r"^photos\/2020\/", false).unwrap();
        assert!(p.is_match("photos/2020/a.jpg"));
        assert!(!p.is_match("photos/2021/a.jpg"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = Pattern::regex("(unclosed", false).unwrap_err();
        assert!(matches!(err, SemanticError::InvalidPattern { .. }));
    }

    #[test]
    fn test_equality_ignores_compiled_form() {
        let a = Pattern::glob("*cat*", false).unwrap();
        let b = Pattern::glob("*cat*", false).unwrap();
        let c = Pattern::glob("*cat*", true).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "\"*cat*\"");
    }
}
