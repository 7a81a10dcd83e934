//! 布尔表达式化简
//!
//! 化简不会改变求值结果，只是让求值更快：否定被推到叶子上，嵌套的与/或被展平，
//! 重复项、矛盾项和常量被消去，与运算的操作数按代价排序。

use std::collections::HashSet;

use super::{Expr, MetaKey};

/// 反复化简直到结果不再变化
pub fn simplify(expr: Expr) -> Expr {
    let mut current = expr;
    loop {
        let next = rewrite(current.clone());
        if next == current {
            return next;
        }
        current = next;
    }
}

/// 静态的求值代价等级，与运算中代价低的操作数先求值
///
/// 标签只需查找倒排列表；扩展名、文件名、路径需要扫描元数据；相似度需要比较所有指纹。
pub fn cost(expr: &Expr) -> u8 {
    match expr {
        Expr::Nothing | Expr::Everything => 0,
        Expr::Atom(_) => 1,
        Expr::Not(inner) => match inner.as_ref() {
            Expr::Atom(_) => 2,
            other => cost(other),
        },
        Expr::Meta(pred) => match pred.key {
            MetaKey::Type => 3,
            MetaKey::Name | MetaKey::Path => 5,
            MetaKey::SimilarTo => 6,
        },
        Expr::Or(parts) => parts.iter().map(cost).max().unwrap_or(0).max(4),
        Expr::And(parts) => parts.iter().map(cost).max().unwrap_or(0),
    }
}

fn rewrite(expr: Expr) -> Expr {
    match expr {
        Expr::Not(inner) => negate(*inner),
        Expr::And(parts) => rewrite_and(parts),
        Expr::Or(parts) => rewrite_or(parts),
        leaf => leaf,
    }
}

/// 化简 `Not(expr)`
fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Not(inner) => rewrite(*inner),
        Expr::And(parts) => rewrite_or(parts.into_iter().map(Expr::not).collect()),
        Expr::Or(parts) => rewrite_and(parts.into_iter().map(Expr::not).collect()),
        Expr::Nothing => Expr::Everything,
        Expr::Everything => Expr::Nothing,
        leaf => Expr::not(leaf),
    }
}

fn complement(expr: &Expr) -> Expr {
    match expr {
        Expr::Not(inner) => inner.as_ref().clone(),
        other => Expr::not(other.clone()),
    }
}

/// 去重并保留第一次出现的顺序，存在互补项时返回 true
fn dedup(parts: &mut Vec<Expr>) -> bool {
    let mut seen = HashSet::with_capacity(parts.len());
    parts.retain(|part| seen.insert(part.clone()));
    parts.iter().any(|part| seen.contains(&complement(part)))
}

fn rewrite_and(parts: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(parts.len());
    for part in parts.into_iter().map(rewrite) {
        match part {
            Expr::Nothing => return Expr::Nothing,
            Expr::Everything => {}
            Expr::And(nested) => flat.extend(nested),
            other => flat.push(other),
        }
    }
    if dedup(&mut flat) {
        return Expr::Nothing;
    }
    match flat.len() {
        0 => Expr::Everything,
        1 => flat.remove(0),
        _ => {
            flat.sort_by_key(cost);
            Expr::And(flat)
        }
    }
}

fn rewrite_or(parts: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(parts.len());
    for part in parts.into_iter().map(rewrite) {
        match part {
            Expr::Everything => return Expr::Everything,
            Expr::Nothing => {}
            Expr::Or(nested) => flat.extend(nested),
            other => flat.push(other),
        }
    }
    if dedup(&mut flat) {
        return Expr::Everything;
    }
    match flat.len() {
        0 => Expr::Nothing,
        1 => flat.remove(0),
        _ => Expr::Or(flat),
    }
}
