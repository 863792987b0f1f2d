use std::{io::Write, path::PathBuf};

use console::style;
use datapack_blobstore::{BatchReport, BlobOrchestrator, GetOutcome, PutOutcome};
use datapack_digest::{compute_file_digest_async, ContentHash};
use datapack_index::DatasetIndex;
use datapack_types::Manifest;
use itertools::Itertools;

use super::Context;

#[derive(Debug, clap::Subcommand)]
pub enum Opt {
    /// Upload a blob to the store
    Put(Transfer),

    /// Download a blob from the store
    Get(Transfer),

    /// Print the store URL of a blob
    Url {
        /// The hash of the blob
        hash: String,
    },

    /// Print the content of a blob
    Show {
        /// The hash of the blob
        hash: String,
    },

    /// Print the hash of a file
    Hash {
        /// The file to hash
        file: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
pub struct Transfer {
    /// The hash of the blob
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    hash: Option<String>,

    /// The file to transfer. Defaults to the paths the manifest lists for
    /// the hash.
    #[arg(conflicts_with = "all")]
    path: Option<PathBuf>,

    /// Transfer every blob of the manifest, including the manifest itself
    #[arg(long)]
    all: bool,
}

pub async fn execute(opt: Opt, ctx: &Context) -> anyhow::Result<()> {
    match opt {
        Opt::Put(transfer) => put(transfer, ctx).await,
        Opt::Get(transfer) => get(transfer, ctx).await,
        Opt::Url { hash } => {
            let index = ctx.index()?;
            println!("{}", index.blobs().url(&parse_hash(&hash)?)?);
            Ok(())
        }
        Opt::Show { hash } => {
            let index = ctx.index()?;
            let manifest = ctx.manifest()?;
            let bytes = index.blobs().read_blob(&manifest, &parse_hash(&hash)?).await?;
            std::io::stdout().lock().write_all(&bytes)?;
            Ok(())
        }
        Opt::Hash { file } => {
            println!("{}", compute_file_digest_async(ctx.path(&file)).await?);
            Ok(())
        }
    }
}

fn parse_hash(hash: &str) -> anyhow::Result<ContentHash> {
    let hash = BlobOrchestrator::validate_hashes([hash])?;
    hash.into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no hash given"))
}

/// The hashes a transfer applies to.
fn hashes(transfer: &Transfer, ctx: &Context) -> anyhow::Result<Vec<String>> {
    if transfer.all {
        let manifest = ctx.manifest()?;
        let mut hashes = manifest.all_hashes().iter().map(ToString::to_string).collect_vec();
        hashes.push(manifest.manifest_hash()?.to_string());
        Ok(hashes)
    } else {
        Ok(transfer.hash.iter().cloned().collect())
    }
}

async fn put(transfer: Transfer, ctx: &Context) -> anyhow::Result<()> {
    let index = ctx.index()?;
    let blobs = index.blobs();

    if let (Some(hash), Some(path)) = (&transfer.hash, &transfer.path) {
        let outcome = blobs.put_blob(&parse_hash(hash)?, &ctx.path(path)).await?;
        print_put(hash, outcome);
        return Ok(());
    }

    let manifest = ctx.manifest()?;
    let report = blobs.put_blobs(&manifest, hashes(&transfer, ctx)?).await?;
    print_report(&report, |outcome| match outcome {
        PutOutcome::AlreadyPresent => "exists",
        PutOutcome::Uploaded => "uploaded",
    });
    Ok(())
}

async fn get(transfer: Transfer, ctx: &Context) -> anyhow::Result<()> {
    let index = ctx.index()?;
    let blobs = index.blobs();

    if let (Some(hash), Some(path)) = (&transfer.hash, &transfer.path) {
        // Files listed in the manifest, if there is one, are copied from.
        let manifest = Manifest::from_root_or_default(&ctx.dir)?;
        let outcome = blobs
            .get_blob(&manifest, &parse_hash(hash)?, &ctx.path(path))
            .await?;
        println!("{} {hash} {}", describe_get(&outcome), path.display());
        return Ok(());
    }

    let manifest = ctx.manifest()?;
    let report = blobs.get_blobs(&manifest, hashes(&transfer, ctx)?).await?;
    print_report(&report, describe_get);
    Ok(())
}

fn print_put(hash: &str, outcome: PutOutcome) {
    match outcome {
        PutOutcome::AlreadyPresent => println!("{} {hash}", style("exists").dim()),
        PutOutcome::Uploaded => println!("{} {hash}", style("uploaded").green()),
    }
}

fn describe_get(outcome: &GetOutcome) -> &'static str {
    match outcome {
        GetOutcome::AlreadyPresent => "exists",
        GetOutcome::CopiedFrom(_) => "copied",
        GetOutcome::Downloaded => "downloaded",
    }
}

fn print_report<O>(report: &BatchReport<O>, describe: impl Fn(&O) -> &'static str) {
    for (hash, path, outcome) in &report.outcomes {
        println!(
            "{:>10} {hash} {}",
            style(describe(outcome)).green(),
            path.display()
        );
    }
}
