mod add;
mod define;
mod image;
mod query;
pub mod server;
mod tag;
mod validate;

pub use add::*;
pub use define::*;
pub use image::*;
pub use query::*;
pub use server::*;
pub use tag::*;
pub use validate::*;

use anyhow::Context;
use log::info;

use crate::config::Opts;
use crate::db::{Database, crud};
use crate::index::ImageId;
use crate::library::{Library, LibraryBuilder};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 打开图库，同时返回数据库连接
async fn open_library(opts: &Opts) -> anyhow::Result<(Library, Database)> {
    let library = LibraryBuilder::new(opts.conf_dir.clone()).open().await?;
    let db = library.db().cloned().context("图库没有关联数据库")?;
    Ok((library, db))
}

/// 根据路径查找图片
fn find_image(library: &Library, path: &str) -> anyhow::Result<ImageId> {
    let snapshot = library.snapshot();
    let image = snapshot.index.image_by_path(path).with_context(|| format!("图片不存在: {}", path))?;
    Ok(image.id)
}

/// 创建尚不存在的普通标签
async fn ensure_tags(library: &Library, db: &Database, labels: &[String]) -> anyhow::Result<()> {
    for label in labels {
        if library.snapshot().catalog.tag(label).is_some() {
            continue;
        }
        library.create_tag(label, None, None)?;
        crud::add_tag(db, label, None, None).await?;
        info!("创建标签: {}", label);
    }
    Ok(())
}
