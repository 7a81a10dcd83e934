//! 在标签索引上求值

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use rayon::prelude::*;

use super::{Expr, MetaKey, MetaPredicate, cost};
use crate::error::Cancelled;
use crate::hamming::{Fingerprint, SimilarityConfig};
use crate::index::{Image, ImageId, TagIndex};
use crate::pattern::Pattern;

/// 取消标记，可在多个线程间共享
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }
}

/// 求值结果：图片集合以及相似度查询产生的分数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matches {
    pub ids: BTreeSet<ImageId>,
    pub scores: HashMap<ImageId, f32>,
}

impl Matches {
    pub fn from_ids(ids: BTreeSet<ImageId>) -> Self {
        Self { ids, scores: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn intersect(self, other: Matches) -> Self {
        let ids = self.ids.intersection(&other.ids).copied().collect::<BTreeSet<_>>();
        let scores = merge_scores(self.scores, other.scores, |id| ids.contains(id));
        Self { ids, scores }
    }

    fn union(self, other: Matches) -> Self {
        let (mut large, small) =
            if self.ids.len() >= other.ids.len() { (self, other) } else { (other, self) };
        large.ids.extend(small.ids);
        let scores = merge_scores(large.scores, small.scores, |_| true);
        Self { ids: large.ids, scores }
    }

    fn difference(mut self, other: &Matches) -> Self {
        self.ids.retain(|id| !other.ids.contains(id));
        self.scores.retain(|id, _| !other.ids.contains(id));
        self
    }

    fn complement(self, universe: &BTreeSet<ImageId>) -> Self {
        Self::from_ids(universe.difference(&self.ids).copied().collect())
    }

    /// 按展示顺序返回结果
    ///
    /// 有分数的图片排在前面，按分数从高到低，分数相同时按 ID；其余图片按 ID 升序。
    pub fn ranked(&self) -> Vec<(ImageId, Option<f32>)> {
        let mut scored = self
            .ids
            .iter()
            .filter_map(|id| self.scores.get(id).map(|score| (*id, *score)))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut result = scored.into_iter().map(|(id, score)| (id, Some(score))).collect::<Vec<_>>();
        result.extend(self.ids.iter().filter(|id| !self.scores.contains_key(id)).map(|id| (*id, None)));
        result
    }
}

fn merge_scores(
    mut a: HashMap<ImageId, f32>,
    b: HashMap<ImageId, f32>,
    keep: impl Fn(&ImageId) -> bool,
) -> HashMap<ImageId, f32> {
    a.retain(|id, _| keep(id));
    for (id, score) in b {
        if keep(&id) {
            a.entry(id).and_modify(|s| *s = s.max(score)).or_insert(score);
        }
    }
    a
}

/// 对化简后的查询求值
pub fn evaluate(
    expr: &Expr,
    index: &TagIndex,
    similarity: &SimilarityConfig,
    cancel: &CancelToken,
) -> Result<Matches, Cancelled> {
    Evaluator::new(index, similarity, cancel).evaluate(expr)
}

/// 自底向上求值，全集在求值开始时确定
pub struct Evaluator<'a> {
    index: &'a TagIndex,
    similarity: &'a SimilarityConfig,
    cancel: &'a CancelToken,
    universe: BTreeSet<ImageId>,
}

impl<'a> Evaluator<'a> {
    pub fn new(index: &'a TagIndex, similarity: &'a SimilarityConfig, cancel: &'a CancelToken) -> Self {
        Self { index, similarity, cancel, universe: index.universe() }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Matches, Cancelled> {
        self.cancel.check()?;
        match expr {
            Expr::Nothing => Ok(Matches::default()),
            Expr::Everything => Ok(Matches::from_ids(self.universe.clone())),
            Expr::Atom(label) => Ok(Matches::from_ids(
                self.index.images_with_tag(label).cloned().unwrap_or_default(),
            )),
            Expr::Meta(pred) => self.evaluate_meta(pred),
            Expr::Not(inner) => Ok(self.evaluate(inner)?.complement(&self.universe)),
            Expr::And(parts) => self.evaluate_and(parts),
            Expr::Or(parts) => {
                let mut acc = Matches::default();
                for part in parts {
                    acc = acc.union(self.evaluate(part)?);
                }
                Ok(acc)
            }
        }
    }

    /// 按代价从低到高求交集，否定项用差集代替补集
    fn evaluate_and(&self, parts: &[Expr]) -> Result<Matches, Cancelled> {
        let mut order = parts.iter().collect::<Vec<_>>();
        order.sort_by_key(|part| self.estimate(part));

        let mut iter = order.into_iter();
        let Some(first) = iter.next() else {
            return Ok(Matches::from_ids(self.universe.clone()));
        };
        let mut acc = self.evaluate(first)?;
        for part in iter {
            if acc.is_empty() {
                debug!("交集为空，跳过剩余的操作数");
                break;
            }
            acc = match part {
                Expr::Not(inner) => acc.difference(&self.evaluate(inner)?),
                _ => acc.intersect(self.evaluate(part)?),
            };
        }
        Ok(acc)
    }

    /// 操作数求值顺序：静态代价、是否为否定、倒排列表长度
    fn estimate(&self, expr: &Expr) -> (u8, bool, usize) {
        let size = match expr {
            Expr::Atom(label) => self.index.posting_len(label),
            _ => 0,
        };
        (cost(expr), matches!(expr, Expr::Not(_)), size)
    }

    fn evaluate_meta(&self, pred: &MetaPredicate) -> Result<Matches, Cancelled> {
        let pattern = &pred.pattern;
        match pred.key {
            MetaKey::Type => self.scan(|image| pattern.is_match(&image.extension)),
            MetaKey::Name => self.scan(|image| pattern.is_match(&image.name)),
            MetaKey::Path => self.scan(|image| pattern.is_match(&image.path)),
            MetaKey::SimilarTo => self.similar_to(pattern),
        }
    }

    fn scan<F>(&self, predicate: F) -> Result<Matches, Cancelled>
    where
        F: Fn(&Image) -> bool + Sync,
    {
        let ids = self
            .index
            .images()
            .par_iter()
            .filter(|(_, image)| !self.cancel.is_cancelled() && predicate(image))
            .map(|(id, _)| *id)
            .collect::<BTreeSet<_>>();
        self.cancel.check()?;
        Ok(Matches::from_ids(ids))
    }

    /// 路径匹配的图片作为参照，与任一参照的距离在阈值内的其它图片即为结果
    fn similar_to(&self, pattern: &Pattern) -> Result<Matches, Cancelled> {
        let references = self
            .index
            .images()
            .values()
            .filter(|image| pattern.is_match(&image.path))
            .map(|image| (image.id, image.fingerprint))
            .collect::<Vec<_>>();
        self.cancel.check()?;

        let excluded = references.iter().map(|(id, _)| *id).collect::<HashSet<_>>();
        let fingerprints = references.iter().filter_map(|(_, fp)| *fp).collect::<Vec<Fingerprint>>();
        if fingerprints.is_empty() {
            debug!("相似查询 {} 没有可用的参照图片", pattern);
            return Ok(Matches::default());
        }

        let scored = self
            .index
            .images()
            .par_iter()
            .filter_map(|(id, image)| {
                if self.cancel.is_cancelled() || excluded.contains(id) {
                    return None;
                }
                let fingerprint = image.fingerprint?;
                fingerprints
                    .iter()
                    .filter_map(|reference| self.similarity.score(*reference, fingerprint))
                    .reduce(f32::max)
                    .map(|score| (*id, score))
            })
            .collect::<Vec<_>>();
        self.cancel.check()?;

        debug!("相似查询 {}: {} 张参照图片，{} 个结果", pattern, fingerprints.len(), scored.len());
        Ok(Matches {
            ids: scored.iter().map(|(id, _)| *id).collect(),
            scores: scored.into_iter().collect(),
        })
    }
}
