use std::{io, path::PathBuf};

use clap::{Parser, Subcommand};
use objzip::{Client, CompressionConfig, storage};
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Directory holding one sub-directory per bucket.
    #[arg(long, default_value = ".objzip")]
    root: PathBuf,
    /// JSON compression settings; defaults and OBJZIP_* variables otherwise.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    Put {
        bucket: String,
        key: String,
        /// Read from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    Get {
        bucket: String,
        key: String,
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => CompressionConfig::from_json_file(path)?,
        None => CompressionConfig::from_env()?,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    match args.command {
        Commands::Put {
            bucket,
            key,
            input,
            overwrite,
        } => {
            let store = storage::FsObjectStore::new(args.root, overwrite).await?;
            let client = Client::from_store(store).with_config(config)?;

            let source: storage::ObjectBody = match input {
                Some(path) => Box::new(fs::File::open(path).await?),
                None => Box::new(tokio::io::stdin()),
            };

            let receipt = client.put(&cancel, source, &bucket, &key).await?;

            let line = serde_json::to_string(&receipt).map_err(io::Error::other)?;
            println!("{line}");
        }
        Commands::Get {
            bucket,
            key,
            output,
        } => {
            let store = storage::FsObjectStore::new(args.root, false).await?;
            let client = Client::from_store(store).with_config(config)?;

            let mut reader = client.get(&cancel, &bucket, &key).await?;

            let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match output {
                Some(path) => Box::new(fs::File::create(path).await?),
                None => Box::new(tokio::io::stdout()),
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(objzip::Error::Cancelled.into()),
                res = tokio::io::copy(&mut reader, &mut sink) => {
                    res?;
                }
            }
            sink.flush().await?;
            reader.close();
        }
    }

    Ok(())
}
