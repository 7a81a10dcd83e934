use clap::Parser;
use log::info;

use crate::cli::{SubCommandExtend, ensure_tags, open_library};
use crate::config::Opts;
use crate::db::crud;
use crate::hamming::{Fingerprint, encode_fingerprint, parse_fingerprint};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// 图片路径
    pub path: String,
    /// 图片的 64 位感知哈希，16 位十六进制数
    #[arg(short, long, value_name = "HEX", value_parser = parse_fingerprint)]
    pub fingerprint: Option<Fingerprint>,
    /// 图片的标签，多个标签用逗号分隔，不存在的标签会被自动创建
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let (library, db) = open_library(opts).await?;

        // 先在内存中检查，再写入数据库
        let id = library.register_image(&self.path, self.fingerprint)?;
        ensure_tags(&library, &db, &self.tags).await?;
        library.set_image_tags(id, &self.tags)?;

        let fingerprint = self.fingerprint.map(encode_fingerprint);
        let id = crud::add_image(&db, &self.path, fingerprint.as_ref().map(|f| f.as_slice())).await?;
        crud::set_image_tags(&db, id, &self.tags).await?;

        info!("添加图片 {} => {}", self.path, id);
        println!("[OK] Add {}", self.path);
        Ok(())
    }
}
