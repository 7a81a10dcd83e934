use clap::Parser;

use crate::cli::{SubCommandExtend, ensure_tags, find_image, open_library};
use crate::config::Opts;
use crate::db::crud;

#[derive(Parser, Debug, Clone)]
pub struct TagCommand {
    /// 图片路径
    pub path: String,
    /// 标签列表，不存在的标签会被自动创建
    pub tags: Vec<String>,
    /// 保留图片原有的标签
    #[arg(short, long)]
    pub append: bool,
    /// 从图片上移除给出的标签
    #[arg(short, long, conflicts_with = "append")]
    pub remove: bool,
}

impl SubCommandExtend for TagCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let (library, db) = open_library(opts).await?;
        let id = find_image(&library, &self.path)?;

        let current = library.snapshot().index.tags_of(id).cloned().unwrap_or_default();
        let labels = if self.remove {
            current.into_iter().filter(|label| !self.tags.contains(label)).collect::<Vec<_>>()
        } else if self.append {
            current.into_iter().chain(self.tags.iter().cloned()).collect()
        } else {
            self.tags.clone()
        };

        if !self.remove {
            ensure_tags(&library, &db, &self.tags).await?;
        }
        library.set_image_tags(id, &labels)?;
        crud::set_image_tags(&db, id, &labels).await?;

        println!("[OK] {}: {}", self.path, labels.join(" "));
        Ok(())
    }
}
