use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use listing_watch::extract::{extract, sanitize};
use listing_watch::fingerprint::fingerprint;
use listing_watch::model::RawItem;
use listing_watch::normalize::normalize;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run the listing extractor over a saved page and print what it finds"
)]
struct Args {
    /// Rendered HTML file, e.g. saved with `chromium --headless --dump-dom`
    html: PathBuf,

    /// Source URL the page was rendered from; prints its fingerprint
    #[arg(long)]
    url: Option<String>,

    /// Emit one JSON object per item instead of a table
    #[arg(long)]
    json: bool,

    /// Write the sanitized markup to this path
    #[arg(long)]
    dump_sanitized: Option<PathBuf>,
}

/// One `--json` output line: the extracted card plus its parsed price.
#[derive(Debug, Serialize)]
struct ItemLine<'a> {
    #[serde(flatten)]
    item: &'a RawItem,
    price: Option<i64>,
    error: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let markup = std::fs::read_to_string(&args.html)
        .with_context(|| format!("failed to read {}", args.html.display()))?;

    if let Some(url) = &args.url {
        println!("Source: {url}");
        println!("Fingerprint: {}", fingerprint(url));
    }
    if let Some(path) = &args.dump_sanitized {
        std::fs::write(path, sanitize(&markup))?;
    }

    let items = extract(&markup)?;
    let mut unreadable = 0;
    for item in &items {
        let price = normalize(&item.raw_price);
        if price.is_err() {
            unreadable += 1;
        }
        if args.json {
            let line = ItemLine {
                item,
                price: price.as_ref().ok().copied(),
                error: price.as_ref().err().map(|e| e.to_string()),
            };
            println!("{}", serde_json::to_string(&line)?);
        } else {
            match price {
                Ok(p) => println!("{:>8}  {}  {}", p, item.title, item.link),
                Err(err) => println!("{:>8}  {}  {}  ({err})", "-", item.title, item.link),
            }
        }
    }
    if !args.json {
        println!("{} items, {} with unreadable price", items.len(), unreadable);
    }
    Ok(())
}
