use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{BuildError, BuildResult};

pub const DEFAULT_COMPILER: &str = "glslangValidator";
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "spv";
pub const DEFAULT_INPUT_DIR: &str = "shaders";
pub const DEFAULT_OUTPUT_DIR: &str = "spirv";
pub const CONFIG_FILE_NAME: &str = "shader_build.toml";

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// How the external shader compiler is invoked and what it produces.
///
/// Every field has a default, so a configuration file only needs to name the
/// keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub compiler: String,

    /// Arguments passed to the compiler. `{input}` is replaced by the shader
    /// path, `{output}` by the artifact path inside the job directory.
    pub args: Vec<String>,

    /// Extension (without the dot) of the files the compiler produces.
    pub artifact_extension: String,

    /// Source files with one of these extensions are not compiled, e.g. `glsl`
    /// for include-only files.
    pub ignored_extensions: Vec<String>,

    /// Number of compiler processes running at once, 0 picks one per CPU.
    pub jobs: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            compiler: DEFAULT_COMPILER.to_owned(),
            args: vec![
                "-V".to_owned(),
                INPUT_PLACEHOLDER.to_owned(),
                "-o".to_owned(),
                OUTPUT_PLACEHOLDER.to_owned(),
            ],
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_owned(),
            ignored_extensions: vec![],
            jobs: 1,
        }
    }
}

impl CompilerConfig {
    pub fn load(path: impl AsRef<Path>) -> BuildResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BuildError::Configuration(format!("Could not read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content)
            .map_err(|e| BuildError::Configuration(format!("In config file {path:?}: {e}")))
    }

    pub fn from_toml(content: &str) -> BuildResult<Self> {
        let config: CompilerConfig =
            toml::from_str(content).map_err(|e| BuildError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.compiler.trim().is_empty() {
            return Err(BuildError::Configuration(
                "The compiler executable name is empty".to_owned(),
            ));
        }
        if self.artifact_extension.is_empty() {
            return Err(BuildError::Configuration(
                "The artifact extension is empty".to_owned(),
            ));
        }
        if self.artifact_extension.starts_with('.') {
            return Err(BuildError::Configuration(format!(
                "The artifact extension {:?} must not start with a dot",
                self.artifact_extension
            )));
        }
        Ok(())
    }

    pub fn compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn ignore_extension(mut self, extension: impl Into<String>) -> Self {
        self.ignored_extensions.push(extension.into());
        self
    }

    /// The program to spawn. Compilers run from a scratch directory, so a
    /// relative path like `./bin/glslangValidator` is made absolute first. Bare
    /// names are left to the PATH lookup.
    pub(crate) fn resolved_compiler(&self) -> BuildResult<String> {
        let path = Path::new(&self.compiler);
        if path.components().count() <= 1 {
            return Ok(self.compiler.clone());
        }
        let path = std::path::absolute(path)
            .map_err(BuildError::io("Could not resolve compiler path", path))?;
        Ok(path.to_string_lossy().into_owned())
    }

    pub(crate) fn worker_count(&self) -> usize {
        match self.jobs {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    pub(crate) fn is_ignored(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                self.ignored_extensions
                    .iter()
                    .any(|ignored| ext == ignored.as_str())
            })
            .unwrap_or(false)
    }

    pub(crate) fn is_artifact(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == self.artifact_extension.as_str())
            .unwrap_or(false)
    }

    /// The artifact name the compiler is asked to produce for `file_name`,
    /// e.g. `a.vert` -> `a.vert.spv`.
    pub fn artifact_name(&self, file_name: &str) -> String {
        format!("{}.{}", file_name, self.artifact_extension)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::CompilerConfig;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.compiler, "glslangValidator");
        assert_eq!(config.args, ["-V", "{input}", "-o", "{output}"]);
        assert_eq!(config.artifact_extension, "spv");
        assert_eq!(config.jobs, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CompilerConfig::from_toml(
            r#"
            compiler = "/opt/vulkan/bin/glslangValidator"
            jobs = 4
            ignored_extensions = ["glsl", "incl"]
            "#,
        )
        .unwrap();

        assert_eq!(config.compiler, "/opt/vulkan/bin/glslangValidator");
        assert_eq!(config.jobs, 4);
        assert_eq!(config.artifact_extension, "spv");
        assert_eq!(config.args, CompilerConfig::default().args);
        assert!(config.is_ignored(Path::new("shaders/common.glsl")));
        assert!(!config.is_ignored(Path::new("shaders/pbr.frag")));
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(CompilerConfig::from_toml("compilr = \"typo\"").is_err());
        assert!(CompilerConfig::from_toml("compiler = \"\"").is_err());
        assert!(CompilerConfig::from_toml("artifact_extension = \".spv\"").is_err());
        assert!(CompilerConfig::from_toml("jobs = \"many\"").is_err());
    }

    #[test]
    fn test_artifact_names() {
        let config = CompilerConfig::default();
        assert_eq!(config.artifact_name("a.vert"), "a.vert.spv");
        assert!(config.is_artifact(Path::new("b.frag.spv")));
        assert!(!config.is_artifact(Path::new("b.frag")));
        assert!(!config.is_artifact(Path::new("spv")));
    }

    #[test]
    fn test_resolved_compiler() {
        let bare = CompilerConfig::default();
        assert_eq!(bare.resolved_compiler().unwrap(), "glslangValidator");

        let relative = CompilerConfig::default().compiler("./bin/glslangValidator");
        let resolved = PathBuf::from(relative.resolved_compiler().unwrap());
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("bin/glslangValidator"));

        #[cfg(unix)]
        {
            let absolute = CompilerConfig::default().compiler("/opt/vulkan/bin/glslangValidator");
            assert_eq!(
                absolute.resolved_compiler().unwrap(),
                "/opt/vulkan/bin/glslangValidator"
            );
        }
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(CompilerConfig::default().jobs(3).worker_count(), 3);
        assert!(CompilerConfig::default().jobs(0).worker_count() >= 1);
    }
}
