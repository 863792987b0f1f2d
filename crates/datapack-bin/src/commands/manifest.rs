use std::path::PathBuf;

use console::style;
use datapack_types::Manifest;

use super::Context;

#[derive(Debug, clap::Subcommand)]
pub enum Opt {
    /// Hash every file of a dataset into its manifest
    Generate {
        /// The root of the dataset, defaults to the working directory
        dir: Option<PathBuf>,
    },

    /// Verify files against their hash in the manifest
    Check {
        /// Paths relative to the dataset root
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

pub async fn execute(opt: Opt, ctx: &Context) -> anyhow::Result<()> {
    match opt {
        Opt::Generate { dir } => {
            let root = dir.map_or_else(|| ctx.dir.clone(), |dir| ctx.path(&dir));
            let mut manifest = Manifest::from_root_or_default(&root)?;
            manifest.generate(&ctx.generate_options())?;
            println!(
                "{} {} file(s) in {}",
                style("hashed").green(),
                manifest.len(),
                manifest.path().display()
            );
            Ok(())
        }
        Opt::Check { paths } => {
            let manifest = ctx.manifest()?;
            let mut failed = 0;
            for path in &paths {
                if manifest.check(path)? {
                    println!("{} {path}", style("ok").green());
                } else {
                    failed += 1;
                    println!("{} {path}", style("FAILED").red().bold());
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed}/{} checksums failed", paths.len());
            }
            Ok(())
        }
    }
}
