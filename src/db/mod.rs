use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};
use sqlx::{SqlitePool, sqlite::*};

use crate::catalog::{Catalog, Tag, TagType};
use crate::hamming::decode_fingerprint;
use crate::index::{Image, TagIndex};
use crate::library::Snapshot;

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

pub async fn init_db(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    if let Some(parent) = filename.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// 从数据库读取完整的标签目录和索引
///
/// 不合法的记录会被跳过并输出警告，不会导致加载失败。
pub async fn load_snapshot(db: &Database) -> anyhow::Result<Snapshot> {
    let mut catalog = Catalog::new();
    let mut index = TagIndex::new();

    for record in crud::list_tag_types(db).await? {
        let Some(symbol) = record.symbol.chars().next() else {
            warn!("跳过没有符号的标签类型: {}", record.label);
            continue;
        };
        match TagType::new(record.id, record.label, symbol, record.color as u32) {
            Ok(tag_type) => catalog.insert_type(tag_type)?,
            Err(e) => warn!("跳过标签类型 {}: {}", record.id, e),
        }
    }

    for record in crud::list_tags(db).await? {
        let mut type_id = record.type_id;
        if let Some(id) = type_id.filter(|id| catalog.tag_type(*id).is_none()) {
            warn!("标签 {} 的类型 {} 不存在，已忽略", record.label, id);
            type_id = None;
        }
        match Tag::new(record.id, record.label, type_id, record.definition) {
            Ok(tag) => catalog.insert_tag(tag)?,
            Err(e) => warn!("跳过标签 {}: {}", record.id, e),
        }
    }

    for record in crud::list_images(db).await? {
        let fingerprint = record.fingerprint.as_deref().and_then(decode_fingerprint);
        if record.fingerprint.is_some() && fingerprint.is_none() {
            warn!("图片 {} 的指纹长度不正确，已忽略", record.path);
        }
        index.insert_image(Image::new(record.id, record.path, fingerprint))?;
    }

    let mut image_tags = HashMap::<i64, Vec<String>>::new();
    for record in crud::list_image_tags(db).await? {
        match catalog.tag(&record.label) {
            Some(tag) if tag.is_compound() => {
                warn!("复合标签 {} 不能关联到图片 {}", record.label, record.image_id)
            }
            _ => image_tags.entry(record.image_id).or_default().push(record.label),
        }
    }
    for (image_id, labels) in image_tags {
        index.set_tags(image_id, labels)?;
    }

    info!("加载了 {} 个标签，{} 张图片", catalog.len(), index.len());
    Ok(Snapshot { catalog, index })
}
