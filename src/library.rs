use std::sync::{Arc, RwLock};
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::{Catalog, Tag, TagCatalog, TagId, TagType, TagTypeId};
use crate::config::ConfDir;
use crate::db::{self, Database};
use crate::error::{EvaluationWarning, LibraryError, QueryError};
use crate::hamming::{Distance, Fingerprint, SimilarityConfig};
use crate::index::{Image, ImageId, TagIndex};
use crate::metrics;
use crate::query::{
    CancelToken, Expr, MetaKey, ResolverCache, Resolver, evaluate, parse, simplify,
};

/// 某一时刻的标签目录和索引，查询开始时取得，之后不再变化
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub catalog: Catalog,
    pub index: TagIndex,
}

/// 一条查询结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ScoredImage {
    pub id: ImageId,
    pub path: String,
    /// 相似度查询的置信度，范围 (0, 1]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutput {
    pub images: Vec<ScoredImage>,
    pub warnings: Vec<EvaluationWarning>,
}

/// 编译后的查询
#[derive(Debug, Clone)]
pub struct Compiled {
    pub expr: Expr,
    pub warnings: Vec<EvaluationWarning>,
}

pub struct LibraryBuilder {
    conf_dir: ConfDir,
    similarity: SimilarityConfig,
}

impl LibraryBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir, similarity: SimilarityConfig::default() }
    }

    /// 相似度阈值
    pub fn threshold(mut self, threshold: u32) -> Self {
        self.similarity.threshold = threshold;
        self
    }

    pub fn metric(mut self, metric: Arc<dyn Distance>) -> Self {
        self.similarity.metric = metric;
        self
    }

    pub async fn open(self) -> anyhow::Result<Library> {
        let db = db::init_db(self.conf_dir.database()).await?;
        let snapshot = db::load_snapshot(&db).await?;
        let mut library = Library::new(snapshot, self.similarity);
        library.db = Some(db);
        Ok(library)
    }
}

/// 图库：持有共享的快照和复合标签缓存
///
/// 查询只克隆快照的 `Arc`，修改时写时复制，正在进行的查询不受影响。
pub struct Library {
    db: Option<Database>,
    snapshot: RwLock<Arc<Snapshot>>,
    cache: ResolverCache,
    similarity: SimilarityConfig,
}

impl Library {
    pub fn new(snapshot: Snapshot, similarity: SimilarityConfig) -> Self {
        Self {
            db: None,
            snapshot: RwLock::new(Arc::new(snapshot)),
            cache: ResolverCache::new(),
            similarity,
        }
    }

    pub fn db(&self) -> Option<&Database> {
        self.db.as_ref()
    }

    pub fn similarity(&self) -> &SimilarityConfig {
        &self.similarity
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().expect("failed to acquire rw lock").clone()
    }

    /// 解析、展开并化简一条查询
    pub fn compile(&self, text: &str, snapshot: &Snapshot) -> Result<Compiled, QueryError> {
        let start = Instant::now();
        let expr = parse(text)?;
        debug!("解析: {}", expr);
        let mut resolved = Resolver::new(&snapshot.catalog).with_cache(&self.cache).resolve(expr)?;
        debug!("展开: {}", resolved.expr);
        for warning in missing_references(&resolved.expr, &snapshot.index) {
            if !resolved.warnings.contains(&warning) {
                resolved.warnings.push(warning);
            }
        }
        let expr = simplify(resolved.expr);
        debug!("化简: {} ({:.2}ms)", expr, start.elapsed().as_secs_f32() * 1000.);
        Ok(Compiled { expr, warnings: resolved.warnings })
    }

    pub fn compile_and_run(
        &self,
        text: &str,
        cancel: &CancelToken,
    ) -> Result<QueryOutput, QueryError> {
        let start = Instant::now();
        let result = self.run(text, cancel);
        let elapsed = start.elapsed().as_secs_f32();
        match &result {
            Ok(output) => {
                debug!("查询 {:?} 得到 {} 张图片 ({:.2}ms)", text, output.images.len(), elapsed * 1000.);
                metrics::inc_query_count("ok");
                metrics::observe_query_duration(elapsed);
                metrics::observe_result_count(output.images.len());
            }
            Err(QueryError::Cancelled) => metrics::inc_query_count("cancelled"),
            Err(_) => metrics::inc_query_count("error"),
        }
        result
    }

    fn run(&self, text: &str, cancel: &CancelToken) -> Result<QueryOutput, QueryError> {
        let snapshot = self.snapshot();
        let compiled = self.compile(text, &snapshot)?;
        let matches = evaluate(&compiled.expr, &snapshot.index, &self.similarity, cancel)?;

        let images = matches
            .ranked()
            .into_iter()
            .filter_map(|(id, score)| {
                let image = snapshot.index.metadata_of(id)?;
                Some(ScoredImage { id, path: image.path.clone(), score })
            })
            .collect();
        Ok(QueryOutput { images, warnings: compiled.warnings })
    }

    /// 检查查询能否执行，不扫描索引
    pub fn validate(&self, text: &str) -> Result<Vec<EvaluationWarning>, QueryError> {
        let snapshot = self.snapshot();
        Ok(self.compile(text, &snapshot)?.warnings)
    }

    /// 返回化简后的查询
    pub fn explain(&self, text: &str) -> Result<String, QueryError> {
        let snapshot = self.snapshot();
        Ok(self.compile(text, &snapshot)?.expr.to_string())
    }

    /// 没有任何标签的图片
    pub fn untagged_images(&self) -> Vec<Image> {
        let snapshot = self.snapshot();
        snapshot
            .index
            .untagged()
            .into_iter()
            .filter_map(|id| snapshot.index.metadata_of(id).cloned())
            .collect()
    }

    /// 从数据库重新加载全部数据
    pub async fn reload(&self) -> anyhow::Result<()> {
        let Some(db) = &self.db else {
            return Ok(());
        };
        let snapshot = db::load_snapshot(db).await?;
        let mut lock = self.snapshot.write().expect("failed to acquire rw lock");
        *lock = Arc::new(snapshot);
        self.cache.clear();
        info!("重新加载图库");
        Ok(())
    }

    /// 在写锁内修改快照，返回后失效受影响的缓存
    ///
    /// `f` 必须在检查完所有前置条件之后再修改快照。
    fn mutate<R>(
        &self,
        affected: &[&str],
        f: impl FnOnce(&mut Snapshot) -> Result<R, LibraryError>,
    ) -> Result<R, LibraryError> {
        let mut lock = self.snapshot.write().expect("failed to acquire rw lock");
        let from = lock.catalog.version();
        let snapshot = Arc::make_mut(&mut lock);
        let result = f(snapshot)?;
        let to = snapshot.catalog.version();
        if from != to {
            self.cache.invalidate(affected, from, to);
        }
        Ok(result)
    }

    pub fn register_image(
        &self,
        path: &str,
        fingerprint: Option<Fingerprint>,
    ) -> Result<ImageId, LibraryError> {
        self.mutate(&[], |snapshot| {
            let id = snapshot.index.next_image_id();
            snapshot.index.insert_image(Image::new(id, path, fingerprint))?;
            Ok(id)
        })
    }

    pub fn insert_image(&self, image: Image) -> Result<(), LibraryError> {
        self.mutate(&[], |snapshot| snapshot.index.insert_image(image))
    }

    pub fn remove_image(&self, id: ImageId) -> Result<Image, LibraryError> {
        self.mutate(&[], |snapshot| snapshot.index.remove_image(id))
    }

    pub fn move_image(&self, id: ImageId, path: &str) -> Result<(), LibraryError> {
        self.mutate(&[], |snapshot| snapshot.index.move_image(id, path))
    }

    pub fn set_fingerprint(
        &self,
        id: ImageId,
        fingerprint: Option<Fingerprint>,
    ) -> Result<(), LibraryError> {
        self.mutate(&[], |snapshot| snapshot.index.set_fingerprint(id, fingerprint))
    }

    pub fn tag_image(&self, id: ImageId, label: &str) -> Result<bool, LibraryError> {
        self.mutate(&[], |snapshot| {
            check_assignable(&snapshot.catalog, label)?;
            snapshot.index.tag(id, label)
        })
    }

    pub fn untag_image(&self, id: ImageId, label: &str) -> Result<bool, LibraryError> {
        self.mutate(&[], |snapshot| snapshot.index.untag(id, label))
    }

    /// 替换图片的标签，所有标签必须存在且不是复合标签
    pub fn set_image_tags(&self, id: ImageId, labels: &[String]) -> Result<(), LibraryError> {
        self.mutate(&[], |snapshot| {
            for label in labels {
                check_assignable(&snapshot.catalog, label)?;
            }
            snapshot.index.set_tags(id, labels.iter().cloned())
        })
    }

    pub fn create_tag_type(
        &self,
        label: &str,
        symbol: char,
        color: u32,
    ) -> Result<TagTypeId, LibraryError> {
        self.mutate(&[], |snapshot| {
            let id = snapshot.catalog.next_type_id();
            snapshot.catalog.insert_type(TagType::new(id, label, symbol, color)?)?;
            Ok(id)
        })
    }

    pub fn insert_tag_type(&self, tag_type: TagType) -> Result<(), LibraryError> {
        self.mutate(&[], |snapshot| snapshot.catalog.insert_type(tag_type))
    }

    pub fn remove_tag_type(&self, id: TagTypeId) -> Result<TagType, LibraryError> {
        self.mutate(&[], |snapshot| snapshot.catalog.remove_type(id))
    }

    pub fn create_tag(
        &self,
        label: &str,
        type_id: Option<TagTypeId>,
        definition: Option<String>,
    ) -> Result<TagId, LibraryError> {
        self.mutate(&[label], |snapshot| {
            let id = snapshot.catalog.next_tag_id();
            snapshot.catalog.insert_tag(Tag::new(id, label, type_id, definition)?)?;
            Ok(id)
        })
    }

    pub fn insert_tag(&self, tag: Tag) -> Result<(), LibraryError> {
        let label = tag.label.clone();
        self.mutate(&[label.as_str()], |snapshot| snapshot.catalog.insert_tag(tag))
    }

    /// 修改标签定义，已关联图片的标签不能变为复合标签
    pub fn redefine_tag(&self, label: &str, definition: Option<String>) -> Result<(), LibraryError> {
        self.mutate(&[label], |snapshot| {
            if definition.is_some() && snapshot.index.posting_len(label) > 0 {
                return Err(LibraryError::CompoundAssociation(label.to_string()));
            }
            snapshot.catalog.set_definition(label, definition)
        })
    }

    pub fn set_tag_type(&self, label: &str, type_id: Option<TagTypeId>) -> Result<(), LibraryError> {
        self.mutate(&[], |snapshot| snapshot.catalog.set_type(label, type_id))
    }

    /// 删除标签及其所有关联
    pub fn remove_tag(&self, label: &str) -> Result<Tag, LibraryError> {
        self.mutate(&[label], |snapshot| {
            let tag = snapshot.catalog.remove_tag(label)?;
            snapshot.index.drop_tag(label);
            Ok(tag)
        })
    }
}

fn check_assignable(catalog: &Catalog, label: &str) -> Result<(), LibraryError> {
    match catalog.tag(label) {
        None => Err(LibraryError::UnknownTag(label.to_string())),
        Some(tag) if tag.is_compound() => Err(LibraryError::CompoundAssociation(label.to_string())),
        Some(_) => Ok(()),
    }
}

/// 找不到任何带指纹参照图片的 `similar_to`
fn missing_references(expr: &Expr, index: &TagIndex) -> Vec<EvaluationWarning> {
    expr.metas()
        .into_iter()
        .filter(|meta| meta.key == MetaKey::SimilarTo)
        .filter(|meta| {
            !index
                .images()
                .values()
                .any(|image| image.fingerprint.is_some() && meta.pattern.is_match(&image.path))
        })
        .map(|meta| EvaluationWarning::NoReference { pattern: meta.pattern.to_string() })
        .collect()
}
