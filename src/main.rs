use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;
use registry_scout::{configuration::get_configuration, startup::run_group};

/// Scrapes the corporate registry for every keyword of a group.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Keyword group; keywords are read from `<keywords_dir>/<GROUP>.txt`.
    group: String,
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Single egress proxy for the sequential mode.
    #[arg(long)]
    proxy: Option<String>,
    /// One proxy per line; switches to one session per keyword.
    #[arg(long)]
    proxy_list_file: Option<PathBuf>,
    #[arg(long)]
    headless: bool,
    #[arg(long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut configuration = get_configuration()?;

    if let Some(out_dir) = args.out_dir {
        configuration.application.output_dir = out_dir;
    }
    if args.proxy.is_some() {
        configuration.proxy.url = args.proxy;
    }
    if args.proxy_list_file.is_some() {
        configuration.proxy.list_file = args.proxy_list_file;
    }
    if args.headless {
        configuration.application.headless = true;
    }
    if let Some(batch_size) = args.batch_size {
        configuration.application.batch_size = batch_size;
    }

    log::info!(
        "Scraping group {} into {}",
        args.group,
        configuration.application.output_dir.display()
    );
    run_group(configuration, &args.group).await?;
    Ok(())
}
