use std::path::PathBuf;

use thiserror::Error;

use crate::CompilationFailure;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{} shader(s) failed to compile: {}", .failures.len(), failed_names(.failures))]
    Compilation { failures: Vec<CompilationFailure> },

    #[error("Could not run shader compiler {compiler:?}, is it installed and in PATH?")]
    UnsupportedEnvironment {
        compiler: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context} {path:?}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type BuildResult<T> = Result<T, BuildError>;

impl BuildError {
    pub(crate) fn io(
        context: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| BuildError::Io {
            context,
            path,
            source,
        }
    }
}

fn failed_names(failures: &[CompilationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.source_path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
