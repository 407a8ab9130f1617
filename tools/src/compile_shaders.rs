use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use shader_build_utils::{
    BuildError, BuildReport, CompilerConfig, ShaderCompiler, SourceDirectoryOptions,
    CONFIG_FILE_NAME, DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_DIR,
};

/// Compiles every shader in a directory with glslangValidator and collects
/// the SPIR-V output in another directory.
#[derive(Parser, Debug)]
#[command(version, about)]
struct CompileShadersArgs {
    /// Directory holding the shader sources [default: <project root>/shaders]
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Directory receiving the compiled shaders [default: <project root>/spirv]
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Root the default directories and config file are resolved against
    #[arg(long, value_name = "DIR", default_value = ".")]
    project_root: PathBuf,

    /// TOML compiler configuration [default: <project root>/shader_build.toml, if present]
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Shader compiler executable
    #[arg(long, value_name = "EXE")]
    compiler: Option<String>,

    /// Number of shaders compiled at once, 0 uses every CPU
    #[arg(long, short)]
    jobs: Option<usize>,

    /// Preprocessor define passed to every shader, NAME or NAME=VALUE
    #[arg(long = "define", short = 'D', value_name = "NAME")]
    defines: Vec<String>,
}

impl CompileShadersArgs {
    fn input_dir(&self) -> PathBuf {
        self.input_dir
            .clone()
            .unwrap_or_else(|| self.project_root.join(DEFAULT_INPUT_DIR))
    }

    fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.project_root.join(DEFAULT_OUTPUT_DIR))
    }

    fn compiler_config(&self) -> anyhow::Result<CompilerConfig> {
        let mut config = match self.config_file() {
            Some(path) => {
                info!("Using config file {path:?}");
                CompilerConfig::load(&path)?
            }
            None => CompilerConfig::default(),
        };

        if let Some(compiler) = &self.compiler {
            config = config.compiler(compiler);
        }
        if let Some(jobs) = self.jobs {
            config = config.jobs(jobs);
        }
        config.validate()?;
        Ok(config)
    }

    fn config_file(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => {
                let path = self.project_root.join(CONFIG_FILE_NAME);
                path.is_file().then_some(path)
            }
        }
    }

    fn source_options(&self) -> SourceDirectoryOptions {
        self.defines
            .iter()
            .fold(SourceDirectoryOptions::default(), |options, define| {
                options.define(define)
            })
    }
}

fn run(args: &CompileShadersArgs) -> anyhow::Result<BuildReport> {
    let config = args.compiler_config()?;
    let input_dir = args.input_dir();
    let output_dir = args.output_dir();
    info!("Compiling shaders from {input_dir:?} into {output_dir:?}");

    let report = ShaderCompiler::new()
        .with_config(config)
        .add_source_directory(&input_dir, &output_dir, args.source_options())
        .compile()
        .with_context(|| format!("While compiling shaders in {}", input_dir.display()))?;
    Ok(report)
}

fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<BuildError>() {
        Some(BuildError::Compilation { .. }) => 1,
        Some(BuildError::Configuration(_)) => 2,
        Some(BuildError::UnsupportedEnvironment { .. }) => 3,
        Some(BuildError::Io { .. }) | None => 4,
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CompileShadersArgs::parse();

    match run(&args).and_then(|report| Ok(report.into_result()?)) {
        Ok(artifacts) => {
            info!("{} shader(s) compiled", artifacts.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
