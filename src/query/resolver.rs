//! 复合标签展开

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use super::{Expr, parse};
use crate::catalog::TagCatalog;
use crate::error::{EvaluationWarning, QueryError, SemanticError};

/// 展开后的查询
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub expr: Expr,
    pub warnings: Vec<EvaluationWarning>,
}

/// 一个复合标签的展开结果
#[derive(Debug, Clone)]
struct Expansion {
    expr: Arc<Expr>,
    /// 展开过程中访问过的所有标签，包括不存在的
    deps: HashSet<String>,
    warnings: Vec<EvaluationWarning>,
    /// 计算时目录的版本
    version: u64,
}

/// 复合标签展开结果的缓存
///
/// 每个条目都带有目录版本号，只有版本一致时才会被使用。
#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: Mutex<HashMap<String, Expansion>>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("failed to lock resolver cache").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, label: &str, version: u64) -> Option<Expansion> {
        let entries = self.entries.lock().expect("failed to lock resolver cache");
        entries.get(label).filter(|e| e.version == version).cloned()
    }

    fn insert(&self, label: String, expansion: Expansion) {
        let mut entries = self.entries.lock().expect("failed to lock resolver cache");
        // 旧快照上的查询不能覆盖新版本的条目
        if entries.get(&label).is_some_and(|e| e.version > expansion.version) {
            return;
        }
        entries.insert(label, expansion);
    }

    /// 目录从 `from` 版本变为 `to` 版本，`labels` 为发生变化的标签
    ///
    /// 依赖这些标签的条目被删除，其余版本为 `from` 的条目更新为 `to`，更旧的条目一并删除。
    pub fn invalidate<S: AsRef<str>>(&self, labels: &[S], from: u64, to: u64) {
        let mut entries = self.entries.lock().expect("failed to lock resolver cache");
        let before = entries.len();
        entries.retain(|key, entry| {
            let stale = entry.version != from
                || labels.iter().any(|l| key == l.as_ref() || entry.deps.contains(l.as_ref()));
            if !stale {
                entry.version = to;
            }
            !stale
        });
        debug!("缓存失效: 删除 {} 条，保留 {} 条", before - entries.len(), entries.len());
    }

    pub fn clear(&self) {
        self.entries.lock().expect("failed to lock resolver cache").clear();
    }
}

/// 展开过程中收集的信息
#[derive(Debug, Default)]
struct Frame {
    deps: HashSet<String>,
    warnings: Vec<EvaluationWarning>,
}

impl Frame {
    fn merge(&mut self, deps: &HashSet<String>, warnings: &[EvaluationWarning]) {
        self.deps.extend(deps.iter().cloned());
        for warning in warnings {
            if !self.warnings.contains(warning) {
                self.warnings.push(warning.clone());
            }
        }
    }

    fn warn(&mut self, warning: EvaluationWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

/// 深度优先展开复合标签
///
/// 展开栈中记录正在展开的标签，再次遇到时即发现环。
pub struct Resolver<'a, C: TagCatalog + ?Sized> {
    catalog: &'a C,
    cache: Option<&'a ResolverCache>,
    stack: Vec<String>,
}

impl<'a, C: TagCatalog + ?Sized> Resolver<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog, cache: None, stack: vec![] }
    }

    pub fn with_cache(mut self, cache: &'a ResolverCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn resolve(mut self, expr: Expr) -> Result<Resolved, QueryError> {
        let mut frame = Frame::default();
        let expr = self.expand(expr, &mut frame)?;
        for warning in &frame.warnings {
            warn!("{}", warning);
        }
        Ok(Resolved { expr, warnings: frame.warnings })
    }

    fn expand(&mut self, expr: Expr, frame: &mut Frame) -> Result<Expr, QueryError> {
        match expr {
            Expr::Atom(label) => self.expand_atom(label, frame),
            Expr::Not(inner) => Ok(Expr::not(self.expand(*inner, frame)?)),
            Expr::And(parts) => Ok(Expr::And(self.expand_all(parts, frame)?)),
            Expr::Or(parts) => Ok(Expr::Or(self.expand_all(parts, frame)?)),
            leaf @ (Expr::Meta(_) | Expr::Nothing | Expr::Everything) => Ok(leaf),
        }
    }

    fn expand_all(&mut self, parts: Vec<Expr>, frame: &mut Frame) -> Result<Vec<Expr>, QueryError> {
        parts.into_iter().map(|part| self.expand(part, frame)).collect()
    }

    fn expand_atom(&mut self, label: String, frame: &mut Frame) -> Result<Expr, QueryError> {
        frame.deps.insert(label.clone());

        let catalog = self.catalog;
        let Some(info) = catalog.lookup(&label) else {
            frame.warn(EvaluationWarning::UnknownTag { label });
            return Ok(Expr::Nothing);
        };
        let Some(definition) = info.tag.definition.as_deref() else {
            return Ok(Expr::Atom(label));
        };

        if let Some(i) = self.stack.iter().position(|l| *l == label) {
            let mut cycle = self.stack[i..].to_vec();
            cycle.push(label);
            return Err(SemanticError::CyclicDefinition { cycle }.into());
        }

        let version = catalog.version();
        if let Some(expansion) = self.cache.and_then(|c| c.get(&label, version)) {
            frame.merge(&expansion.deps, &expansion.warnings);
            return Ok(Expr::clone(&expansion.expr));
        }

        let parsed = parse(definition).map_err(|e| SemanticError::InvalidDefinition {
            label: label.clone(),
            source: Box::new(e),
        })?;

        self.stack.push(label.clone());
        let mut inner = Frame::default();
        let result = self.expand(parsed, &mut inner);
        self.stack.pop();
        let expr = result?;

        debug!("展开复合标签 {} => {}", label, expr);
        if let Some(cache) = self.cache {
            cache.insert(
                label,
                Expansion {
                    expr: Arc::new(expr.clone()),
                    deps: inner.deps.clone(),
                    warnings: inner.warnings.clone(),
                    version,
                },
            );
        }
        frame.merge(&inner.deps, &inner.warnings);
        Ok(expr)
    }
}
