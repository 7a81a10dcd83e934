//! 查询引擎的错误类型

use std::fmt;

use thiserror::Error;

/// 查询文本语法错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at position {position}){}", fmt_expected(.expected))]
pub struct SyntaxError {
    /// 出错位置，按字符计数
    pub position: usize,
    /// 可读的错误信息
    pub message: String,
    /// 该位置可以接受的记号
    pub expected: Vec<&'static str>,
}

impl SyntaxError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self { position, message: message.into(), expected: vec![] }
    }

    pub fn expecting(mut self, expected: &[&'static str]) -> Self {
        self.expected = expected.to_vec();
        self
    }
}

fn fmt_expected(expected: &[&'static str]) -> String {
    if expected.is_empty() {
        String::new()
    } else {
        format!(", expected one of: {}", expected.join(", "))
    }
}

/// 语法正确，但无法赋予含义的查询
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    /// 复合标签的定义中存在环
    #[error("cyclic tag definition: {}", .cycle.join(" -> "))]
    CyclicDefinition { cycle: Vec<String> },

    /// 无法编译的通配符或正则表达式
    #[error("invalid pattern: {detail}")]
    InvalidPattern { detail: String },

    /// 复合标签的定义本身无法解析
    #[error("invalid definition of tag '{label}': {source}")]
    InvalidDefinition { label: String, source: Box<QueryError> },
}

/// 执行查询时可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("{0}")]
    Semantic(#[from] SemanticError),

    /// 查询被调用方取消
    #[error("query cancelled")]
    Cancelled,
}

impl From<Cancelled> for QueryError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// 求值被取消，此时索引状态不受影响
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("evaluation cancelled")]
pub struct Cancelled;

/// 不影响查询继续执行的警告
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationWarning {
    /// 标签不存在，按空集处理
    UnknownTag { label: String },
    /// `similar_to` 找不到带指纹的参照图片，按空集处理
    NoReference { pattern: String },
}

impl fmt::Display for EvaluationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag { label } => write!(f, "unknown tag '{}'", label),
            Self::NoReference { pattern } => {
                write!(f, "no fingerprinted image matches similar_to:{}", pattern)
            }
        }
    }
}

/// 修改图库时的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("image {0} does not exist")]
    UnknownImage(i64),

    #[error("tag '{0}' does not exist")]
    UnknownTag(String),

    #[error("tag type {0} does not exist")]
    UnknownTagType(i64),

    #[error("path '{0}' is already registered")]
    DuplicatePath(String),

    #[error("tag '{0}' already exists")]
    DuplicateTag(String),

    #[error("illegal tag label '{0}'")]
    InvalidLabel(String),

    #[error("illegal tag type: {0}")]
    InvalidTagType(String),

    /// 复合标签只能出现在查询中
    #[error("compound tag '{0}' cannot be associated to images")]
    CompoundAssociation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new(3, "unbalanced parentheses").expecting(&["')'"]);
        assert_eq!(
            err.to_string(),
            "unbalanced parentheses (at position 3), expected one of: ')'"
        );
    }

    #[test]
    fn test_cycle_display() {
        let err = SemanticError::CyclicDefinition {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "cyclic tag definition: a -> b -> a");
    }

    #[test]
    fn test_query_error_from() {
        let err: QueryError = SyntaxError::new(0, "empty query").into();
        assert!(matches!(err, QueryError::Syntax(_)));
        let err: QueryError = Cancelled.into();
        assert_eq!(err, QueryError::Cancelled);
    }

    #[test]
    fn test_warning_display() {
        let w = EvaluationWarning::UnknownTag { label: "kat".to_string() };
        assert_eq!(w.to_string(), "unknown tag 'kat'");
        let w = EvaluationWarning::NoReference { pattern: "\"ref.jpg\"".to_string() };
        assert_eq!(w.to_string(), "no fingerprinted image matches similar_to:\"ref.jpg\"");
        assert_eq!(
            serde_json::to_value(&w).unwrap(),
            serde_json::json!({ "kind": "no_reference", "pattern": "\"ref.jpg\"" })
        );
    }

    #[test]
    fn test_syntax_error_without_expected() {
        let err = SyntaxError::new(0, "empty query");
        assert_eq!(err.to_string(), "empty query (at position 0)");
    }
}
