use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ds_client::{
    ClientStore, DriveFileSource, FileSource, LocalFileSource, Submission, UploadCoordinator,
};
use ds_extract::TextExtractor;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "docsum-uploader", about = "Extract a PDF/DOCX locally and request a summary")]
struct Cli {
    /// 服务端地址
    #[arg(long, env = "DOCSUM_SERVER", default_value = "http://localhost:5001")]
    server: String,

    /// 客户端持久化存储目录
    #[arg(long, env = "DOCSUM_STORE", default_value = "data/client")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 上传本地文件
    Upload {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        title: String,
    },
    /// 上传 Drive 中的文件
    Drive {
        #[arg(long)]
        file_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(long, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long)]
        title: String,
    },
    /// 记录用户 ID，后续上传会携带
    SetUser { user_id: String },
    /// 打印上次上传的原文
    Last,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let store = ClientStore::open(&cli.store)
        .with_context(|| format!("open client store {}", cli.store.display()))?;

    match cli.command {
        Command::SetUser { user_id } => {
            store.set_user_id(&user_id)?;
            println!("user id set to {}", user_id);
            Ok(())
        }
        Command::Last => {
            match store.last_original_text()? {
                Some(text) => println!("{}", text),
                None => println!("no document uploaded yet"),
            }
            Ok(())
        }
        Command::Upload { file, title } => {
            upload(&cli.server, store, &LocalFileSource::new(file), &title).await
        }
        Command::Drive {
            file_id,
            name,
            mime_type,
            token,
            title,
        } => {
            let source = DriveFileSource::new(token, file_id, name, mime_type);
            upload(&cli.server, store, &source, &title).await
        }
    }
}

async fn upload(
    server: &str,
    store: ClientStore,
    source: &dyn FileSource,
    title: &str,
) -> anyhow::Result<()> {
    let coordinator = UploadCoordinator::new(server, Arc::new(TextExtractor::default()), store);
    tracing::info!(source = %source.describe(), "uploading");

    match coordinator.submit_from(source, title).await {
        Ok(Submission::Completed(resp)) => {
            if let Some(id) = resp.document_id.as_deref() {
                println!("document: {}", id);
            }
            println!("{}", resp.summary);
            Ok(())
        }
        Ok(Submission::Ignored) => Ok(()),
        Err(e) => {
            let message = coordinator
                .notices()
                .current()
                .await
                .map(|n| n.message)
                .unwrap_or_else(|| e.to_string());
            anyhow::bail!(message)
        }
    }
}

fn init_tracing() {
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
