use itertools::Itertools;

use super::Context;

#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// The `section.key` to show or change. Lists every key when omitted.
    key: Option<String>,

    /// The new value
    value: Option<String>,

    /// Remove the value
    #[arg(long, conflicts_with = "value")]
    unset: bool,
}

pub fn execute(opt: Opt, ctx: &Context) -> anyhow::Result<()> {
    let Some(key) = opt.key else {
        println!("{}", ctx.config.keys().iter().join("\n"));
        return Ok(());
    };

    if opt.value.is_none() && !opt.unset {
        match ctx.config.get(&key)? {
            Some(value) => println!("{value}"),
            None => tracing::info!("'{key}' is not set"),
        }
        return Ok(());
    }

    let Some(path) = &ctx.config_path else {
        anyhow::bail!("could not determine where to save the configuration, pass --config");
    };
    let mut config = ctx.config.clone();
    config.set(&key, opt.value)?;
    config.validate()?;
    config.save(path)?;
    tracing::info!("updated {}", path.display());
    Ok(())
}
