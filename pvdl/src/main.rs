use anyhow::Result;
use clap::Parser;
use pvdl::config::read_config;
use pvdl::core::Pvdl;
use pvdl::resolve::Mode;
use std::path::PathBuf;
use tokio::sync::oneshot;

#[macro_use]
extern crate log;

/// Bulk downloader for pixiv illustrations.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// Overrides `home` from the config file.
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(value_enum)]
    mode: Mode,
    /// Illustration ids, user ids or tags, depending on the mode.
    #[arg(required = true)]
    values: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned());
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filters)
        .init();

    let args = Args::parse();
    let mut conf = read_config(&args.config)?;
    if let Some(root) = args.root {
        conf.root = root;
    }
    let pvdl = Pvdl::new(conf)?;

    let (tx, mut rx) = oneshot::channel();
    let mut tx = Some(tx);
    ctrlc::set_handler(move || match tx.take() {
        Some(tx) => {
            if tx.send(()).is_err() {
                error!("failed to invoke shutdown");
            } else {
                warn!("interrupted, saving profile");
            }
        }
        None => warn!("is shutting down"),
    })?;

    tokio::select! {
        r = pvdl.download(args.mode, &args.values) => {
            let s = r?;
            if s.failed > 0 || s.partial > 0 {
                warn!("{} illusts failed, {} incomplete", s.failed, s.partial);
            }
        }
        _ = &mut rx => {}
    }
    Ok(())
}
