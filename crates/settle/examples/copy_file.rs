//! Copy a file through observed streams
//!
//! Both ends of the copy are tracked: the source must reach end-of-file and
//! the destination must finish flushing. Either side failing or closing
//! early is reported as the copy's error.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example copy_file -- Cargo.toml /tmp/Cargo.toml.copy
//! ```

use anyhow::Context;
use settle::{CompletionConfig, finished};
use settle_transport::{ObservedReader, ObservedWriter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let (Some(from), Some(to)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: copy_file <from> <to>");
    };

    let source = tokio::fs::File::open(&from)
        .await
        .with_context(|| format!("opening {}", from))?;
    let destination = tokio::fs::File::create(&to)
        .await
        .with_context(|| format!("creating {}", to))?;

    let mut reader = ObservedReader::new(source);
    let mut writer = ObservedWriter::new(destination);
    let read_done = finished(&reader, CompletionConfig::default())?;
    let write_done = finished(&writer, CompletionConfig::default())?;

    let copied = tokio::io::copy(&mut reader, &mut writer).await?;
    tokio::io::AsyncWriteExt::shutdown(&mut writer).await?;
    drop(reader);
    drop(writer);

    read_done.await.context("reading source")?;
    write_done.await.context("writing destination")?;
    println!("copied {} bytes from {} to {}", copied, from, to);
    Ok(())
}
