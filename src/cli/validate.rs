use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::library::LibraryBuilder;

#[derive(Parser, Debug, Clone)]
pub struct ValidateCommand {
    /// 查询语句
    #[arg(allow_hyphen_values = true)]
    pub query: String,
}

impl SubCommandExtend for ValidateCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let library = LibraryBuilder::new(opts.conf_dir.clone()).open().await?;
        let warnings = library.validate(&self.query)?;
        for warning in &warnings {
            eprintln!("[WARN] {}", warning);
        }
        println!("[OK] {}", self.query);
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ExplainCommand {
    /// 查询语句
    #[arg(allow_hyphen_values = true)]
    pub query: String,
}

impl SubCommandExtend for ExplainCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let library = LibraryBuilder::new(opts.conf_dir.clone()).open().await?;
        println!("{}", library.explain(&self.query)?);
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct UntaggedCommand {}

impl SubCommandExtend for UntaggedCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let library = LibraryBuilder::new(opts.conf_dir.clone()).open().await?;
        for image in library.untagged_images() {
            println!("{}", image.path);
        }
        Ok(())
    }
}
