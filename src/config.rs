use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::hamming::DEFAULT_THRESHOLD;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "aloxaf", "imtag").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().expect("config dir is not valid utf-8")
}

#[derive(Parser, Debug, Clone)]
pub struct QueryOptions {
    /// 两个指纹被视为相似的最大汉明距离，范围从 0 到 64
    #[arg(long, value_name = "N", default_value_t = DEFAULT_THRESHOLD, value_parser = clap::value_parser!(u32).range(0..=64))]
    pub threshold: u32,
    /// 显示的结果数量，0 表示全部显示
    #[arg(long, value_name = "COUNT", default_value_t = 0)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imtag", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imtag 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 登记图片
    Add(AddCommand),
    /// 移动图片，标签保持不变
    Mv(MoveCommand),
    /// 删除图片记录
    Rm(RemoveCommand),
    /// 设置图片的标签
    Tag(TagCommand),
    /// 创建标签或修改标签定义
    Define(DefineCommand),
    /// 创建标签类型
    DefineType(DefineTypeCommand),
    /// 执行查询
    Query(QueryCommand),
    /// 检查查询是否合法
    Validate(ValidateCommand),
    /// 显示化简后的查询
    Explain(ExplainCommand),
    /// 列出没有标签的图片
    Untagged(UntaggedCommand),
    /// 启动 HTTP 查询服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imtag.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

/// 输出格式
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opts() {
        let opts = Opts::try_parse_from(["imtag", "-c", "/tmp/imtag", "query", "a + b"]).unwrap();
        assert_eq!(opts.conf_dir.database(), PathBuf::from("/tmp/imtag/imtag.db"));
        let SubCommand::Query(cmd) = opts.subcmd else { panic!("expected query") };
        assert_eq!(cmd.query, "a + b");
        assert_eq!(cmd.options.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cmd.output_format, OutputFormat::Table);
    }

    #[test]
    fn test_threshold_range() {
        assert!(Opts::try_parse_from(["imtag", "query", "--threshold", "65", "a"]).is_err());
        assert!(Opts::try_parse_from(["imtag", "query", "--threshold", "64", "a"]).is_ok());
    }
}
