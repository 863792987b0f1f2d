use std::io;

use datapack::DatafileFiller;
use datapack_types::{Datafile, DatafileError, Handle};
use dialoguer::{theme::ColorfulTheme, Input};

/// Asks the user for the Datafile fields a dataset needs before it can be
/// published.
pub struct PromptFiller;

impl DatafileFiller for PromptFiller {
    fn fill(&self, mut datafile: Datafile) -> Result<Datafile, DatafileError> {
        let theme = ColorfulTheme::default();

        let mut handle = match datafile.handle() {
            Ok(handle) if handle.is_valid() => handle,
            _ => Input::<String>::with_theme(&theme)
                .with_prompt("Dataset id (author/name)")
                .validate_with(|input: &String| -> Result<(), String> {
                    Handle::parse(input)
                        .map(|_| ())
                        .map_err(|err| err.to_string())
                })
                .interact_text()
                .map_err(io::Error::from)?
                .parse::<Handle>()?,
        };

        if handle.version.is_none() {
            let version = Input::<String>::with_theme(&theme)
                .with_prompt("Dataset version")
                .interact_text()
                .map_err(io::Error::from)?;
            handle = handle.with_version(version.trim());
        }
        datafile.dataset = handle.to_string();

        if datafile.title.as_deref().map_or(true, str::is_empty) {
            let title = Input::<String>::with_theme(&theme)
                .with_prompt("Dataset title")
                .interact_text()
                .map_err(io::Error::from)?;
            datafile.title = Some(title);
        }

        datafile.validate_for_publish()?;
        Ok(datafile)
    }
}
