use std::path::PathBuf;

use clap::Parser;
use pic_relay::snapshot::{default_output, render_tree, write_document};
use pic_relay::{PlaceholderProber, ScanOptions, Scanner};
use tracing::info;

/// Scan a directory tree and write the JSON document used by the static file browser
#[derive(Parser, Debug)]
#[command(name = "dir-snapshot", version)]
struct Args {
    /// Directory to scan
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Output file (defaults to <root>/directory-data.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip every entry whose name starts with a dot
    #[arg(long)]
    skip_hidden: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pic_relay=info".into()),
        )
        .init();

    let args = Args::parse();
    let options = ScanOptions {
        skip_hidden: args.skip_hidden,
        ..ScanOptions::default()
    };

    // Image labels are placeholders, not measurements
    let mut scanner = Scanner::new(options, PlaceholderProber::new());
    let tree = scanner.scan(&args.root)?;

    let output = args.output.unwrap_or_else(|| default_output(&args.root));
    write_document(&tree, &output)?;
    info!(root = %args.root.display(), "directory scan completed");

    println!("Directory scan completed. Data saved to {}", output.display());
    println!("Total items found: {}", tree.len());
    println!("\nDirectory structure:");
    print!("{}", render_tree(&tree));

    Ok(())
}
