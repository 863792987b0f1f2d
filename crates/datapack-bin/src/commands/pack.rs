use console::style;
use datapack::{DatafileFiller, PublishOutcome, RequireComplete};
use datapack_blobstore::{GetOutcome, PutOutcome};

use super::Context;
use crate::prompt::PromptFiller;

#[derive(Debug, clap::Subcommand)]
pub enum Opt {
    /// Fill in the Datafile and hash every file into the manifest
    Make {
        /// Drop the existing manifest and hash every file again
        #[arg(long)]
        clean: bool,
    },

    /// Upload every blob of the dataset to the store
    Upload,

    /// Download every blob of the dataset from the store
    Download,

    /// Verify every file against the manifest
    Check,

    /// Publish the dataset under the version in its Datafile
    Publish {
        /// Accepted for compatibility. Published versions are never
        /// overwritten.
        #[arg(long)]
        force: bool,
    },
}

pub async fn execute(opt: Opt, ctx: &Context) -> anyhow::Result<()> {
    // Packing and checking work without a configured index.
    let mut pack = match opt {
        Opt::Make { .. } | Opt::Check => ctx.local_pack()?,
        Opt::Upload | Opt::Download | Opt::Publish { .. } => ctx.pack()?,
    };
    match opt {
        Opt::Make { clean } => {
            let filler: &dyn DatafileFiller = if console::user_attended() {
                &PromptFiller
            } else {
                &RequireComplete
            };
            pack.make(clean, filler).await?;
            println!(
                "{} {} ({} files)",
                style("packed").green(),
                pack.datafile().dataset,
                pack.manifest().len()
            );
        }
        Opt::Upload => {
            let report = pack.upload().await?;
            println!(
                "{} {} of {} blob(s)",
                style("uploaded").green(),
                report.count(|o| *o == PutOutcome::Uploaded),
                report.len()
            );
        }
        Opt::Download => {
            let report = pack.download().await?;
            println!(
                "{} {} file(s), {} copied, {} already present",
                style("downloaded").green(),
                report.count(|o| *o == GetOutcome::Downloaded),
                report.count(|o| matches!(o, GetOutcome::CopiedFrom(_))),
                report.count(|o| *o == GetOutcome::AlreadyPresent)
            );
        }
        Opt::Check => {
            let report = pack.check()?;
            println!("{} {} checksums", style("verified").green(), report.checked);
        }
        Opt::Publish { force } => match pack.publish(force).await? {
            PublishOutcome::Published(reference) => {
                println!(
                    "{} {} ({reference})",
                    style("published").green(),
                    pack.datafile().dataset
                );
            }
            PublishOutcome::AlreadyPublished(reference) => {
                println!(
                    "{} {} is already published ({reference})",
                    style("ok").dim(),
                    pack.datafile().dataset
                );
            }
        },
    }
    Ok(())
}
