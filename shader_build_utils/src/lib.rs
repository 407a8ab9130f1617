mod config;
mod error;
mod platform;
mod scratch;

use std::{
    ffi::OsString,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, error, info, warn};

pub use config::*;
pub use error::*;
pub use platform::*;
pub use scratch::ScratchDirectory;

const SCRATCH_PREFIX: &str = "shader-build";

/// Runs an external shader compiler over every file of one or more source
/// directories and gathers the compiled artifacts into output directories.
///
/// ```no_run
/// use shader_build_utils::{ShaderCompiler, SourceDirectoryOptions};
///
/// let report = ShaderCompiler::new()
///     .add_source_directory("shaders/", "spirv/", SourceDirectoryOptions::default())
///     .compile()?;
/// report.into_result()?;
/// # Ok::<(), shader_build_utils::BuildError>(())
/// ```
pub struct ShaderCompiler {
    config: CompilerConfig,
    platform: Arc<dyn Platform>,
    scratch_parent: Option<PathBuf>,

    input_directories: Vec<SourceDirectory>,
}

#[derive(Default, Clone, Debug)]
pub struct SourceDirectoryOptions {
    defines: Vec<String>,
}

struct SourceDirectory {
    path: PathBuf,
    options: SourceDirectoryOptions,
    output_directory: PathBuf,
}

/// A shader file found in a source directory.
#[derive(Clone, Debug)]
pub struct ShaderSource {
    pub path: PathBuf,
    pub file_name: String,
    directory: usize,
}

#[derive(Clone, Debug)]
pub struct CompiledArtifact {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct CompilationFailure {
    pub source_path: PathBuf,
    /// `None` if the compiler could not be started or was killed.
    pub exit_code: Option<i32>,
    pub message: String,
}

#[derive(Default, Debug)]
pub struct BuildReport {
    pub artifacts: Vec<CompiledArtifact>,
    pub failures: Vec<CompilationFailure>,
}

struct Job {
    source: ShaderSource,
    directory: PathBuf,
}

impl SourceDirectoryOptions {
    pub fn define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }
}

impl fmt::Display for CompilationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{:?} (exit status {})", self.source_path, code)?,
            None => write!(f, "{:?}", self.source_path)?,
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> BuildResult<Vec<CompiledArtifact>> {
        if self.failures.is_empty() {
            Ok(self.artifacts)
        } else {
            Err(BuildError::Compilation {
                failures: self.failures,
            })
        }
    }
}

impl ShaderCompiler {
    pub fn new() -> Self {
        Self {
            config: CompilerConfig::default(),
            platform: Arc::new(SystemPlatform),
            scratch_parent: None,
            input_directories: vec![],
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_platform(mut self, platform: impl Platform + 'static) -> Self {
        self.platform = Arc::new(platform);
        self
    }

    /// Where the per-build scratch directory is created, e.g. `OUT_DIR` from a
    /// build script. Defaults to the system temp directory.
    pub fn scratch_parent(mut self, directory: impl AsRef<Path>) -> Self {
        self.scratch_parent = Some(directory.as_ref().to_path_buf());
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn add_source_directory(
        mut self,
        directory: impl AsRef<Path>,
        output_directory: impl AsRef<Path>,
        options: SourceDirectoryOptions,
    ) -> Self {
        self.input_directories.push(SourceDirectory {
            path: directory.as_ref().to_path_buf(),
            options,
            output_directory: output_directory.as_ref().to_path_buf(),
        });
        self
    }

    pub fn compile(&self) -> BuildResult<BuildReport> {
        self.config.validate()?;
        for SourceDirectory { path, .. } in &self.input_directories {
            if !path.is_dir() {
                return Err(BuildError::Configuration(format!(
                    "Input directory {:?} does not exist",
                    path
                )));
            }
        }
        let compiler = self.config.resolved_compiler()?;
        self.probe_compiler(&compiler)?;

        for SourceDirectory {
            output_directory, ..
        } in &self.input_directories
        {
            fs::create_dir_all(output_directory).map_err(BuildError::io(
                "Could not create output directory",
                output_directory,
            ))?;
        }

        let sources = self.discover_sources()?;
        if sources.is_empty() {
            info!("No shaders to compile");
            return Ok(BuildReport::default());
        }

        let scratch = match &self.scratch_parent {
            Some(parent) => ScratchDirectory::new_in(parent, SCRATCH_PREFIX),
            None => ScratchDirectory::new(SCRATCH_PREFIX),
        }
        .map_err(BuildError::io(
            "Could not create scratch directory in",
            self.scratch_parent
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        ))?;

        let mut jobs = Vec::with_capacity(sources.len());
        for (i, source) in sources.into_iter().enumerate() {
            let directory = scratch
                .subdirectory(&format!("job-{i}"))
                .map_err(BuildError::io("Could not create job directory in", scratch.path()))?;
            jobs.push(Job { source, directory });
        }

        let outcomes = self.run_jobs(&compiler, &jobs);

        let mut report = BuildReport::default();
        let mut compiled = vec![];
        for (job, outcome) in jobs.iter().zip(outcomes) {
            match outcome {
                Ok(()) => compiled.push(job),
                Err(failure) => report.failures.push(failure),
            }
        }

        // Everything the compiler produced is listed once, before anything moves.
        let mut pending_moves = vec![];
        for job in compiled {
            let artifacts = self.find_artifacts(job)?;
            if artifacts.is_empty() {
                error!(
                    "Compiler accepted {:?} but produced no .{} file",
                    job.source.path, self.config.artifact_extension
                );
                report.failures.push(CompilationFailure {
                    source_path: job.source.path.clone(),
                    exit_code: Some(0),
                    message: "no compiled artifact was produced".to_owned(),
                });
            }
            pending_moves.extend(artifacts.into_iter().map(|artifact| (job, artifact)));
        }

        for (job, artifact) in pending_moves {
            let output_directory =
                &self.input_directories[job.source.directory].output_directory;
            let Some(file_name) = artifact.file_name() else {
                continue;
            };
            let output_path = output_directory.join(file_name);
            self.platform
                .move_file(&artifact, &output_path)
                .map_err(BuildError::io("Could not move compiled shader to", &output_path))?;
            info!("{:?} -> {:?}", job.source.path, output_path);
            report.artifacts.push(CompiledArtifact {
                source_path: job.source.path.clone(),
                output_path,
            });
        }

        if report.success() {
            info!("Compiled {} shader(s)", report.artifacts.len());
        } else {
            error!(
                "{} shader(s) failed to compile, {} artifact(s) written",
                report.failures.len(),
                report.artifacts.len()
            );
        }
        Ok(report)
    }

    fn probe_compiler(&self, compiler: &str) -> BuildResult<()> {
        let probe = CommandLine {
            program: compiler.to_owned(),
            args: vec!["--version".into()],
            working_directory: std::env::temp_dir(),
        };
        match self.platform.run_command(&probe) {
            Ok(output) => {
                if !output.success() {
                    warn!(
                        "{} --version exited with {:?}",
                        self.config.compiler, output.exit_code
                    );
                }
                debug!("Using {}: {}", self.config.compiler, output.stdout.trim());
                Ok(())
            }
            Err(source) => Err(BuildError::UnsupportedEnvironment {
                compiler: self.config.compiler.clone(),
                source,
            }),
        }
    }

    fn discover_sources(&self) -> BuildResult<Vec<ShaderSource>> {
        let mut sources = vec![];
        for (index, SourceDirectory { path: directory, .. }) in
            self.input_directories.iter().enumerate()
        {
            let directory = std::path::absolute(directory)
                .map_err(BuildError::io("Could not resolve directory", directory))?;
            let entries = fs::read_dir(&directory)
                .map_err(BuildError::io("Could not open directory", &directory))?;

            let mut found = vec![];
            for entry in entries {
                let entry = entry.map_err(BuildError::io("Could not list directory", &directory))?;
                let path = entry.path();
                if !path.is_file() {
                    debug!("Skipping {:?}, not a file", path);
                    continue;
                }
                if self.config.is_ignored(&path) {
                    debug!("Skipping {:?}, ignored extension", path);
                    continue;
                }

                found.push(ShaderSource {
                    file_name: entry.file_name().to_string_lossy().into_owned(),
                    path,
                    directory: index,
                });
            }
            found.sort_by(|a, b| a.file_name.cmp(&b.file_name));
            sources.extend(found);
        }
        Ok(sources)
    }

    fn run_jobs(&self, compiler: &str, jobs: &[Job]) -> Vec<Result<(), CompilationFailure>> {
        let workers = self.config.worker_count().min(jobs.len());
        if workers <= 1 {
            return jobs.iter().map(|job| self.run_job(compiler, job)).collect();
        }

        debug!("Compiling {} shaders on {} workers", jobs.len(), workers);
        let (job_sender, job_receiver) = crossbeam::channel::unbounded();
        let (result_sender, result_receiver) = crossbeam::channel::unbounded();
        for job in jobs.iter().enumerate() {
            // the receiver is alive until the end of this function
            let _ = job_sender.send(job);
        }
        drop(job_sender);

        let scope_result = crossbeam::scope(|scope| {
            for _ in 0..workers {
                let job_receiver = job_receiver.clone();
                let result_sender = result_sender.clone();
                scope.spawn(move |_| {
                    for (index, job) in job_receiver.iter() {
                        let _ = result_sender.send((index, self.run_job(compiler, job)));
                    }
                });
            }
        });
        if let Err(panic) = scope_result {
            std::panic::resume_unwind(panic);
        }
        drop(result_sender);

        let mut outcomes = result_receiver.iter().collect::<Vec<_>>();
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn run_job(&self, compiler: &str, job: &Job) -> Result<(), CompilationFailure> {
        let command = self.command_line(compiler, job);
        info!("Compiling {:?}", job.source.path);

        match self.platform.run_command(&command) {
            Ok(output) if output.success() => {
                if !output.stderr.trim().is_empty() {
                    warn!("{:?}: {}", job.source.path, output.stderr.trim());
                }
                Ok(())
            }
            Ok(output) => {
                let message = [output.stdout.trim(), output.stderr.trim()]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                let failure = CompilationFailure {
                    source_path: job.source.path.clone(),
                    exit_code: output.exit_code,
                    message,
                };
                error!("Failed to compile {}", failure);
                Err(failure)
            }
            Err(e) => {
                let failure = CompilationFailure {
                    source_path: job.source.path.clone(),
                    exit_code: None,
                    message: format!("could not start {}: {}", self.config.compiler, e),
                };
                error!("Failed to compile {}", failure);
                Err(failure)
            }
        }
    }

    fn command_line(&self, compiler: &str, job: &Job) -> CommandLine {
        let output_path = job
            .directory
            .join(self.config.artifact_name(&job.source.file_name));
        let options = &self.input_directories[job.source.directory].options;

        let mut args: Vec<OsString> = options
            .defines
            .iter()
            .map(|define| {
                if define.contains('=') {
                    format!("-D{define}").into()
                } else {
                    format!("-D{define}=1").into()
                }
            })
            .collect();

        for arg in &self.config.args {
            let arg = match arg.as_str() {
                INPUT_PLACEHOLDER => job.source.path.clone().into_os_string(),
                OUTPUT_PLACEHOLDER => output_path.clone().into_os_string(),
                _ => arg
                    .replace(INPUT_PLACEHOLDER, &job.source.path.to_string_lossy())
                    .replace(OUTPUT_PLACEHOLDER, &output_path.to_string_lossy())
                    .into(),
            };
            args.push(arg);
        }

        CommandLine {
            program: compiler.to_owned(),
            args,
            working_directory: job.directory.clone(),
        }
    }

    fn find_artifacts(&self, job: &Job) -> BuildResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&job.directory)
            .map_err(BuildError::io("Could not open job directory", &job.directory))?;

        let mut artifacts = vec![];
        for entry in entries {
            let entry =
                entry.map_err(BuildError::io("Could not list job directory", &job.directory))?;
            let path = entry.path();
            if path.is_file() && self.config.is_artifact(&path) {
                artifacts.push(path);
            }
        }
        artifacts.sort();
        Ok(artifacts)
    }
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}
