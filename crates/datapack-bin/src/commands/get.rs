use console::style;
use datapack_index::is_archive_url;
use datapack_types::Handle;
use url::Url;

use super::Context;

#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// A dataset handle (`author/name[@version]`) or the URL of an archive
    dataset: String,
}

/// Downloads the archive of a dataset into `datasets/.downloads`. The archive
/// is not extracted.
pub async fn execute(opt: Opt, ctx: &Context) -> anyhow::Result<()> {
    let index = ctx.index()?;
    let url = if is_archive_url(&opt.dataset) {
        Url::parse(&opt.dataset)?
    } else {
        let handle: Handle = opt.dataset.parse()?;
        anyhow::ensure!(handle.is_valid(), "'{handle}' is not a valid dataset handle");
        index.archive_url(&handle)?
    };

    let path = index.download_archive(&url, &ctx.dir).await?;
    println!("{} {}", style("downloaded").green(), path.display());
    Ok(())
}
