use crate::{
    template::{Placeholder, Substitutions, Template, TemplateError},
    timing::StartTime,
};
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Template {0:?} not found")]
    TemplateNotFound(PathBuf),
    #[error("Failed to read template {path:?}")]
    TemplateUnreadable { path: PathBuf, source: io::Error },
    #[error("Template {path:?} is invalid: {source}")]
    InvalidTemplate {
        path: PathBuf,
        source: TemplateError,
    },
    #[error("Failed to write config {path:?}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },
}

/// `<configs_dir>/run.<start_time>.cfg`
pub fn config_path(configs_dir: &Path, start_time: &StartTime) -> PathBuf {
    configs_dir.join(format!("run.{start_time}.cfg"))
}

/// Writes one configuration file per time window from a shared template
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    template: PathBuf,
    configs_dir: PathBuf,
}

impl ConfigMaterializer {
    pub fn new(template: impl Into<PathBuf>, configs_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            configs_dir: configs_dir.into(),
        }
    }

    fn load_template(&self) -> Result<Template, MaterializeError> {
        let source = fs::read_to_string(&self.template).map_err(|error| match error.kind() {
            ErrorKind::NotFound => MaterializeError::TemplateNotFound(self.template.clone()),
            _ => MaterializeError::TemplateUnreadable {
                path: self.template.clone(),
                source: error,
            },
        })?;

        Template::parse(&source).map_err(|source| MaterializeError::InvalidTemplate {
            path: self.template.clone(),
            source,
        })
    }

    /// Render the template for `start_time` and return the path of the written config.
    ///
    /// An existing config for the same start time is replaced. The content is
    /// written to a temporary sibling first and renamed into place, so a failed
    /// run never leaves a truncated config behind.
    #[tracing::instrument(level = "debug", skip(self, start_time), fields(start_time = %start_time))]
    pub fn materialize(&self, start_time: &StartTime) -> Result<PathBuf, MaterializeError> {
        let template = self.load_template()?;
        let rendered = template
            .render(&Substitutions::from([(
                Placeholder::StartTime,
                start_time.to_string(),
            )]))
            .map_err(|source| MaterializeError::InvalidTemplate {
                path: self.template.clone(),
                source,
            })?;

        let target = config_path(&self.configs_dir, start_time);
        let staging = self
            .configs_dir
            .join(format!(".run.{start_time}.cfg.{}.tmp", process::id()));
        let write_failed = |source: io::Error| MaterializeError::WriteFailed {
            path: target.clone(),
            source,
        };

        fs::create_dir_all(&self.configs_dir).map_err(write_failed)?;
        debug!(staging = ?staging, "Writing rendered template");

        if let Err(error) = fs::write(&staging, rendered).and_then(|_| fs::rename(&staging, &target))
        {
            if let Err(cleanup) = fs::remove_file(&staging) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(staging = ?staging, error = ?cleanup, "Failed to remove staging file");
                }
            }

            return Err(write_failed(error));
        }

        info!(config = ?target, "Materialized config");

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::compute_start_time;
    use tempfile::TempDir;

    const TEMPLATE: &str = "[default]\nstart_time = @START_TIME@\noutput = out/@START_TIME@\n";

    fn setup(template: &str) -> (TempDir, ConfigMaterializer) {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("run.cfg.in");
        fs::write(&template_path, template).unwrap();
        let materializer = ConfigMaterializer::new(template_path, dir.path().join("configs"));

        (dir, materializer)
    }

    #[test]
    fn writes_config_named_after_start_time() {
        let (dir, materializer) = setup(TEMPLATE);
        let start_time = compute_start_time(3).unwrap();

        let path = materializer.materialize(&start_time).unwrap();

        assert_eq!(
            path,
            dir.path().join("configs/run.2009-04-06T01:30:00.cfg")
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[default]\nstart_time = 2009-04-06T01:30:00\noutput = out/2009-04-06T01:30:00\n"
        );
    }

    #[test]
    fn materialize_is_idempotent() {
        let (_dir, materializer) = setup(TEMPLATE);
        let start_time = compute_start_time(7).unwrap();

        let first_path = materializer.materialize(&start_time).unwrap();
        let first = fs::read(&first_path).unwrap();
        let second_path = materializer.materialize(&start_time).unwrap();

        assert_eq!(first_path, second_path);
        assert_eq!(first, fs::read(&second_path).unwrap());
    }

    #[test]
    fn overwrites_existing_config() {
        let (dir, materializer) = setup(TEMPLATE);
        let start_time = compute_start_time(1).unwrap();
        fs::create_dir_all(dir.path().join("configs")).unwrap();
        fs::write(config_path(&dir.path().join("configs"), &start_time), "stale").unwrap();

        let path = materializer.materialize(&start_time).unwrap();

        assert!(fs::read_to_string(path).unwrap().starts_with("[default]"));
    }

    #[test]
    fn missing_template_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let configs = dir.path().join("configs");
        let materializer = ConfigMaterializer::new(dir.path().join("absent.cfg.in"), &configs);

        let result = materializer.materialize(&compute_start_time(1).unwrap());

        assert!(matches!(result, Err(MaterializeError::TemplateNotFound(_))));
        assert!(!configs.exists());
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let (dir, materializer) = setup("a = @START_TIME@\nb = @STOP@\n");

        let result = materializer.materialize(&compute_start_time(1).unwrap());

        assert!(matches!(
            result,
            Err(MaterializeError::InvalidTemplate {
                source: TemplateError::UnknownPlaceholder { .. },
                ..
            })
        ));
        assert!(!dir.path().join("configs").exists());
    }

    #[test]
    fn unwritable_destination() {
        let (dir, _) = setup(TEMPLATE);
        // a regular file where the configs directory should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "").unwrap();
        let materializer = ConfigMaterializer::new(dir.path().join("run.cfg.in"), &blocker);

        let result = materializer.materialize(&compute_start_time(1).unwrap());

        assert!(matches!(result, Err(MaterializeError::WriteFailed { .. })));
    }
}
