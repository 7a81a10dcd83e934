//! 标签查询语言
//!
//! 查询文本依次经过解析、复合标签展开、化简和求值四个阶段：
//!
//! ```text
//! "a (b + c) + -(d e) type:jpg"
//!     -> parse     语法树
//!     -> resolve   展开复合标签，检查定义中的环
//!     -> simplify  否定下推、扁平化、去重、矛盾检测
//!     -> evaluate  在标签索引上求值，得到图片集合
//! ```

mod eval;
mod parser;
mod resolver;
mod simplify;

use std::fmt;

pub use eval::*;
pub use parser::parse;
pub use resolver::*;
pub use simplify::{cost, simplify};

use crate::pattern::Pattern;

/// 元标签的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    /// 图片扩展名，`type` 和 `ext` 等价
    Type,
    /// 不含扩展名的文件名
    Name,
    /// 完整路径
    Path,
    /// 与指定图片相似
    SimilarTo,
}

impl MetaKey {
    /// 所有保留的键名
    pub const KEYWORDS: &'static [&'static str] = &["type", "ext", "name", "path", "similar_to"];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "type" | "ext" => Some(Self::Type),
            "name" => Some(Self::Name),
            "path" => Some(Self::Path),
            "similar_to" => Some(Self::SimilarTo),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Name => "name",
            Self::Path => "path",
            Self::SimilarTo => "similar_to",
        }
    }

    /// 扩展名比较时不区分大小写
    pub fn case_insensitive(&self) -> bool {
        matches!(self, Self::Type)
    }
}

/// 针对图片元数据的谓词，例如 `name:"*cat*"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaPredicate {
    pub key: MetaKey,
    pub pattern: Pattern,
}

impl fmt::Display for MetaPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key.keyword(), self.pattern)
    }
}

/// 查询语法树
///
/// `Nothing` 和 `Everything` 不会由解析器产生，只出现在展开和化简之后。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// 空集
    Nothing,
    /// 全集，即求值开始时所有已登记的图片
    Everything,
    Atom(String),
    Meta(MetaPredicate),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn atom(label: impl Into<String>) -> Self {
        Self::Atom(label.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Self {
        Self::Not(Box::new(expr))
    }

    /// 返回语法树中引用的所有标签，按出现顺序去重
    pub fn labels(&self) -> Vec<&str> {
        let mut labels = vec![];
        self.collect_labels(&mut labels);
        labels
    }

    /// 返回语法树中的所有元数据谓词
    pub fn metas(&self) -> Vec<&MetaPredicate> {
        match self {
            Self::Meta(meta) => vec![meta],
            Self::Not(inner) => inner.metas(),
            Self::And(parts) | Self::Or(parts) => parts.iter().flat_map(Expr::metas).collect(),
            Self::Atom(_) | Self::Nothing | Self::Everything => vec![],
        }
    }

    fn collect_labels<'a>(&'a self, labels: &mut Vec<&'a str>) {
        match self {
            Self::Atom(label) => {
                if !labels.contains(&label.as_str()) {
                    labels.push(label);
                }
            }
            Self::Not(inner) => inner.collect_labels(labels),
            Self::And(parts) | Self::Or(parts) => {
                parts.iter().for_each(|part| part.collect_labels(labels))
            }
            Self::Meta(_) | Self::Nothing | Self::Everything => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => write!(f, "<nothing>"),
            Self::Everything => write!(f, "<everything>"),
            Self::Atom(label) => write!(f, "{}", label),
            Self::Meta(pred) => write!(f, "{}", pred),
            Self::Not(inner) => match inner.as_ref() {
                Self::And(_) | Self::Or(_) => write!(f, "-({})", inner),
                _ => write!(f, "-{}", inner),
            },
            Self::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    match part {
                        Self::Or(_) => write!(f, "({})", part)?,
                        _ => write!(f, "{}", part)?,
                    }
                }
                Ok(())
            }
            Self::Or(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        for query in [
            "a",
            "a b + c",
            "a (b + c)",
            "-(d e) + -f",
            "type:\"jpg\" name:/^img_\\d+$/",
            "--a",
        ] {
            let expr = parse(query).unwrap();
            let rendered = expr.to_string();
            assert_eq!(parse(&rendered).unwrap(), expr, "{} -> {}", query, rendered);
        }
    }

    #[test]
    fn test_labels() {
        let expr = parse("a (b + -a) c type:jpg").unwrap();
        assert_eq!(expr.labels(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_meta_key_synonyms() {
        assert_eq!(MetaKey::from_keyword("ext"), Some(MetaKey::Type));
        assert_eq!(MetaKey::from_keyword("type"), Some(MetaKey::Type));
        assert_eq!(MetaKey::from_keyword("size"), None);
    }
}
