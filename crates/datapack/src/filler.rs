use datapack_types::{Datafile, DatafileError};

/// Fills in the fields of a Datafile that a dataset needs before it can be
/// published, for example by prompting the user.
pub trait DatafileFiller: Send + Sync {
    /// Returns `datafile` with every required field set, or an error if that
    /// is not possible.
    fn fill(&self, datafile: Datafile) -> Result<Datafile, DatafileError>;
}

/// A [`DatafileFiller`] that does not ask for anything. It accepts complete
/// Datafiles and names the missing fields of all others.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireComplete;

impl DatafileFiller for RequireComplete {
    fn fill(&self, datafile: Datafile) -> Result<Datafile, DatafileError> {
        datafile.validate_for_publish()?;
        Ok(datafile)
    }
}

impl<F> DatafileFiller for F
where
    F: Fn(Datafile) -> Result<Datafile, DatafileError> + Send + Sync,
{
    fn fill(&self, datafile: Datafile) -> Result<Datafile, DatafileError> {
        self(datafile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_require_complete() {
        let datafile = Datafile {
            dataset: "jbenet/foo".to_string(),
            ..Datafile::default()
        };
        assert_matches!(
            RequireComplete.fill(datafile.clone()),
            Err(DatafileError::MissingFields(fields)) if fields == ["version", "title"]
        );

        let complete = Datafile {
            dataset: "jbenet/foo@1.0".to_string(),
            title: Some("Foo".to_string()),
            ..datafile
        };
        assert_eq!(RequireComplete.fill(complete.clone()).unwrap(), complete);
    }

    #[test]
    fn test_closure_filler() {
        let filler = |mut datafile: Datafile| {
            datafile.title = Some("Filled".to_string());
            Ok::<_, DatafileError>(datafile)
        };
        let filled = filler.fill(Datafile::default()).unwrap();
        assert_eq!(filled.title.as_deref(), Some("Filled"));
    }
}
