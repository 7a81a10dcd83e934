use anyhow::Result;
use clap::Parser;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OutputFormat, QueryOptions};
use crate::library::{LibraryBuilder, QueryOutput};
use crate::query::CancelToken;

#[derive(Parser, Debug, Clone)]
pub struct QueryCommand {
    #[command(flatten)]
    pub options: QueryOptions,
    /// 查询语句，例如 `cat -dog type:screenshot`
    #[arg(allow_hyphen_values = true)]
    pub query: String,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for QueryCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let library = LibraryBuilder::new(opts.conf_dir.clone())
            .threshold(self.options.threshold)
            .open()
            .await?;

        let mut output =
            block_in_place(|| library.compile_and_run(&self.query, &CancelToken::new()))?;

        for warning in &output.warnings {
            eprintln!("[WARN] {}", warning);
        }
        if self.options.count > 0 {
            output.images.truncate(self.options.count);
        }

        print_result(&output, self)
    }
}

fn print_result(output: &QueryOutput, opts: &QueryCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(output)?)
        }
        OutputFormat::Table => {
            for image in &output.images {
                match image.score {
                    Some(score) => println!("{:.2}\t{}", score, image.path),
                    None => println!("-\t{}", image.path),
                }
            }
        }
    }
    Ok(())
}
