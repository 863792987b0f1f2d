use datapack_index::DatasetIndex;
use datapack_types::{Handle, LATEST};

use super::Context;

#[derive(Debug, clap::Subcommand)]
pub enum Opt {
    /// Print the ref a version of a dataset points to
    Resolve {
        /// The dataset, `author/name[@version]`
        dataset: Handle,

        /// The version to resolve. Defaults to the version of the handle, or
        /// the latest publication.
        version: Option<String>,

        /// Fetch the refs again instead of using cached ones
        #[arg(long)]
        refresh: bool,
    },
}

pub async fn execute(opt: Opt, ctx: &Context) -> anyhow::Result<()> {
    match opt {
        Opt::Resolve {
            dataset,
            version,
            refresh,
        } => {
            anyhow::ensure!(dataset.is_valid(), "'{dataset}' is not a valid dataset handle");
            let index = ctx.index()?;
            let refs = index.ref_index(&dataset.path())?;
            if refresh {
                refs.fetch_refs(true).await?;
            }

            let version = version
                .or(dataset.version)
                .unwrap_or_else(|| LATEST.to_string());
            let reference = refs.version_ref(&version).await?;
            let name = refs.ref_version(&reference.to_string()).await?;
            let published = refs
                .ref_timestamp(&reference)
                .await?
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            println!("{reference} {name} (published {published})");
            Ok(())
        }
    }
}
