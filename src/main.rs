use clap::Parser;
use imtag::Opts;
use imtag::cli::SubCommandExtend;
use imtag::config::SubCommand;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Add(config) => config.run(&opts).await,
        SubCommand::Mv(config) => config.run(&opts).await,
        SubCommand::Rm(config) => config.run(&opts).await,
        SubCommand::Tag(config) => config.run(&opts).await,
        SubCommand::Define(config) => config.run(&opts).await,
        SubCommand::DefineType(config) => config.run(&opts).await,
        SubCommand::Query(config) => config.run(&opts).await,
        SubCommand::Validate(config) => config.run(&opts).await,
        SubCommand::Explain(config) => config.run(&opts).await,
        SubCommand::Untagged(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
