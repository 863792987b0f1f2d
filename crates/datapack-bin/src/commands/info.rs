use datapack::{installed_datafile, installed_datasets};
use datapack_types::{Datafile, Handle, DATAFILE_NAME};

use super::Context;

#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// An installed dataset. Defaults to the dataset in the working
    /// directory.
    dataset: Option<Handle>,
}

pub fn list(ctx: &Context) -> anyhow::Result<()> {
    for handle in installed_datasets(&ctx.dir)? {
        println!("{handle}");
    }
    Ok(())
}

pub fn info(opt: Opt, ctx: &Context) -> anyhow::Result<()> {
    let datafile = match opt.dataset {
        Some(handle) => installed_datafile(&ctx.dir, &handle)?,
        None => Datafile::from_path(&ctx.dir.join(DATAFILE_NAME))?,
    };
    print!("{}", datafile.to_yaml_string()?);
    Ok(())
}
