use anyhow::Context;
use clap::Parser;
use log::info;

use crate::catalog::TagTypeId;
use crate::cli::{SubCommandExtend, open_library};
use crate::config::Opts;
use crate::db::crud;
use crate::library::Library;

#[derive(Parser, Debug, Clone)]
pub struct DefineCommand {
    /// 标签名，只能包含字母、数字和下划线
    pub label: String,
    /// 复合标签的定义，是一条查询，例如 `cat + dog`
    #[arg(short, long, allow_hyphen_values = true)]
    pub definition: Option<String>,
    /// 标签类型的名称
    #[arg(short = 'T', long = "type", value_name = "TYPE")]
    pub tag_type: Option<String>,
    /// 把复合标签变回普通标签
    #[arg(long, conflicts_with = "definition")]
    pub plain: bool,
    /// 删除标签及其所有关联
    #[arg(long, conflicts_with_all = ["definition", "plain", "tag_type"])]
    pub remove: bool,
}

impl SubCommandExtend for DefineCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let (library, db) = open_library(opts).await?;

        if self.remove {
            library.remove_tag(&self.label)?;
            crud::delete_tag(&db, &self.label).await?;
            println!("[OK] Remove tag {}", self.label);
            return Ok(());
        }

        let type_id = self.tag_type.as_deref().map(|name| find_type(&library, name)).transpose()?;
        let existing = library.snapshot().catalog.tag(&self.label).cloned();

        match existing {
            Some(tag) => {
                let definition = match (&self.definition, self.plain) {
                    (Some(definition), _) => Some(definition.clone()),
                    (None, true) => None,
                    (None, false) => tag.definition.clone(),
                };
                let type_id = type_id.or(tag.type_id);
                library.redefine_tag(&self.label, definition.clone())?;
                library.set_tag_type(&self.label, type_id)?;
                check_definition(&library, &self.label)?;
                crud::update_tag(&db, &self.label, type_id, definition.as_deref()).await?;
                info!("修改标签: {}", self.label);
            }
            None => {
                library.create_tag(&self.label, type_id, self.definition.clone())?;
                check_definition(&library, &self.label)?;
                crud::add_tag(&db, &self.label, type_id, self.definition.as_deref()).await?;
                info!("创建标签: {}", self.label);
            }
        }

        match &self.definition {
            Some(definition) => println!("[OK] {} = {}", self.label, definition),
            None => println!("[OK] {}", self.label),
        }
        Ok(())
    }
}

/// 写入数据库之前确认定义可以展开
fn check_definition(library: &Library, label: &str) -> anyhow::Result<()> {
    let warnings = library.validate(label).with_context(|| format!("标签 {} 的定义无效", label))?;
    for warning in warnings {
        eprintln!("[WARN] {}", warning);
    }
    Ok(())
}

fn find_type(library: &Library, name: &str) -> anyhow::Result<TagTypeId> {
    let snapshot = library.snapshot();
    let tag_type = snapshot
        .catalog
        .tag_types()
        .find(|t| t.label == name)
        .with_context(|| format!("标签类型不存在: {}", name))?;
    Ok(tag_type.id)
}

#[derive(Parser, Debug, Clone)]
pub struct DefineTypeCommand {
    /// 类型名称
    pub label: String,
    /// 显示在标签前的单个符号，不能是字母、数字或查询中的运算符
    pub symbol: char,
    /// RGB 颜色，十六进制
    #[arg(long, value_name = "RRGGBB", default_value = "000000", value_parser = parse_color)]
    pub color: u32,
}

impl SubCommandExtend for DefineTypeCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let (library, db) = open_library(opts).await?;
        library.create_tag_type(&self.label, self.symbol, self.color)?;
        crud::add_tag_type(&db, &self.label, self.symbol, self.color).await?;
        println!("[OK] {} {}", self.symbol, self.label);
        Ok(())
    }
}

fn parse_color(s: &str) -> anyhow::Result<u32> {
    let s = s.trim_start_matches('#');
    if s.len() != 6 {
        return Err(anyhow::anyhow!("无效的颜色: {}", s));
    }
    Ok(u32::from_str_radix(s, 16)?)
}
