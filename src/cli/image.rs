use clap::Parser;

use crate::cli::{SubCommandExtend, find_image, open_library};
use crate::config::Opts;
use crate::db::crud;

#[derive(Parser, Debug, Clone)]
pub struct MoveCommand {
    /// 原路径
    pub from: String,
    /// 新路径
    pub to: String,
}

impl SubCommandExtend for MoveCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let (library, db) = open_library(opts).await?;
        let id = find_image(&library, &self.from)?;
        library.move_image(id, &self.to)?;
        crud::update_image_path(&db, id, &self.to).await?;
        println!("[OK] Move {} -> {}", self.from, self.to);
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct RemoveCommand {
    /// 需要删除的图片路径
    #[arg(required = true)]
    pub paths: Vec<String>,
}

impl SubCommandExtend for RemoveCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let (library, db) = open_library(opts).await?;
        for path in &self.paths {
            let id = find_image(&library, path)?;
            library.remove_image(id)?;
            crud::delete_image(&db, id).await?;
            println!("[OK] Remove {}", path);
        }
        Ok(())
    }
}
