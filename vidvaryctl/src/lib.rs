pub mod server;

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use vidvary_core::{
    load_config, ConfigError, FfmpegEngine, FilterStep, PipelineError, Preset,
    RequestWorkspace, ServiceError, VariantOutput, VariantPipeline, VariationService,
    VidvaryConfig,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{}", .0.user_messages().join("\n"))]
    Service(#[from] ServiceError),
    #[error("variant failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
    #[error("invalid bind address {0}")]
    Bind(String),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Generates altered variants of an uploaded video", long_about = None)]
pub struct Cli {
    /// Path to vidvary.toml; built-in defaults are used when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Produces the three variants of a video and packages them as a zip
    Generate(GenerateArgs),
    /// Runs a single variant pipeline
    Variant(VariantArgs),
    /// Lists the presets and the stages each one runs
    Presets,
    /// Checks the media engine and workspace directory
    Health,
    /// Serves the upload form over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Video to transform (mp4, avi or mov)
    pub input: PathBuf,
    /// Directory receiving video_variations.zip
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct VariantArgs {
    /// Video to transform
    pub input: PathBuf,
    /// Preset code; codes other than 1, 2 and 3 skip the preset stage
    #[arg(long)]
    pub preset: u8,
    /// Output file, always written as MP4
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on; overrides server.bind
    #[arg(long)]
    pub bind: Option<String>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Generate(args) => {
            let result = context.generate(args).await?;
            render(&result, cli.format)?;
        }
        Commands::Variant(args) => {
            let result = context.variant(args).await?;
            render(&result, cli.format)?;
        }
        Commands::Presets => {
            let list = context.presets();
            render(&list, cli.format)?;
        }
        Commands::Health => {
            let report = context.health_check().await;
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
        Commands::Serve(args) => {
            let bind = args
                .bind
                .clone()
                .unwrap_or_else(|| context.config.server.bind.clone());
            let addr: SocketAddr = bind.parse().map_err(|_| AppError::Bind(bind.clone()))?;
            server::serve(addr, context.service()).await?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

struct AppContext {
    config: VidvaryConfig,
    config_path: Option<PathBuf>,
    engine: Arc<FfmpegEngine>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => load_config(path)?,
            None => VidvaryConfig::default(),
        };
        let engine = Arc::new(FfmpegEngine::from_config(&config.engine));
        Ok(Self {
            config,
            config_path: cli.config.clone(),
            engine,
        })
    }

    fn pipeline(&self) -> VariantPipeline {
        VariantPipeline::from_config(self.engine.clone(), &self.config.pipeline)
    }

    fn service(&self) -> VariationService {
        VariationService::from_config(&self.config, self.engine.clone())
    }

    async fn generate(&self, args: &GenerateArgs) -> Result<GenerateResult> {
        let bytes = fs::read(&args.input).await.map_err(io_error(&args.input))?;
        let file_name = args
            .input
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let download = self.service().process_upload(&file_name, &bytes).await?;

        fs::create_dir_all(&args.output_dir)
            .await
            .map_err(io_error(&args.output_dir))?;
        let archive = args.output_dir.join(download.file_name);
        fs::write(&archive, &download.bytes)
            .await
            .map_err(io_error(&archive))?;

        Ok(GenerateResult {
            archive,
            archive_size_bytes: download.bytes.len() as u64,
            variants: download
                .report
                .variants
                .iter()
                .map(VariantSummary::from)
                .collect(),
        })
    }

    async fn variant(&self, args: &VariantArgs) -> Result<VariantSummary> {
        if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        let output = self
            .pipeline()
            .produce_variant_code(&args.input, &args.output, args.preset)
            .await?;
        Ok(VariantSummary::from(&output))
    }

    fn presets(&self) -> PresetList {
        let pipeline = self.pipeline();
        let rows = Preset::ALL
            .into_iter()
            .map(|preset| PresetEntry {
                code: preset.code(),
                name: preset.name(),
                description: preset.description(),
                output: preset.output_file_name(),
                stages: pipeline
                    .plan(Some(preset))
                    .into_iter()
                    .map(|(stage, steps)| StageEntry {
                        stage: stage.to_string(),
                        filters: steps.iter().map(FilterStep::to_string).collect(),
                    })
                    .collect(),
            })
            .collect();
        PresetList {
            rows,
            hash_suffix_bytes: self.config.pipeline.hash_suffix_bytes,
        }
    }

    async fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = Vec::new();
        results.push(match &self.config_path {
            Some(path) => HealthEntry::ok("config", format!("{}", path.display())),
            None => HealthEntry::warn("config", "no config file given, using defaults"),
        });
        results.push(match self.engine.version().await {
            Ok(version) => HealthEntry::ok("engine", version),
            Err(err) => HealthEntry::error(
                "engine",
                format!("{} unavailable: {err}", self.engine.binary().display()),
            ),
        });
        results.push(
            match RequestWorkspace::create(self.config.upload.workspace_dir.as_deref()) {
                Ok(workspace) => {
                    let detail = workspace
                        .path()
                        .parent()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    workspace.close();
                    HealthEntry::ok("workspace", detail)
                }
                Err(err) => HealthEntry::error("workspace", format!("cannot create workspace: {err}")),
            },
        );
        results
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AppError {
    let path = path.to_path_buf();
    move |source| AppError::Io { source, path }
}

#[derive(Debug, Serialize)]
pub struct GenerateResult {
    pub archive: PathBuf,
    pub archive_size_bytes: u64,
    pub variants: Vec<VariantSummary>,
}

impl DisplayFallback for GenerateResult {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "{} ({} bytes)",
            self.archive.display(),
            self.archive_size_bytes
        )];
        for variant in &self.variants {
            lines.push(format!("  - {}", variant.display()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct VariantSummary {
    pub preset: Option<u8>,
    pub file: String,
    pub size_bytes: u64,
    pub sha256: String,
}

impl From<&VariantOutput> for VariantSummary {
    fn from(output: &VariantOutput) -> Self {
        Self {
            preset: output.preset.map(Preset::code),
            file: output
                .file_name()
                .unwrap_or_else(|| output.path.display().to_string()),
            size_bytes: output.size_bytes,
            sha256: output.sha256.clone(),
        }
    }
}

impl DisplayFallback for VariantSummary {
    fn display(&self) -> String {
        let preset = self
            .preset
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{file} preset={preset} size={size} sha256={sha}",
            file = self.file,
            size = self.size_bytes,
            sha = self.sha256,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct PresetList {
    pub rows: Vec<PresetEntry>,
    pub hash_suffix_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct PresetEntry {
    pub code: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub output: String,
    pub stages: Vec<StageEntry>,
}

#[derive(Debug, Serialize)]
pub struct StageEntry {
    pub stage: String,
    pub filters: Vec<String>,
}

impl DisplayFallback for PresetList {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for entry in &self.rows {
            let stages: Vec<String> = entry
                .stages
                .iter()
                .map(|stage| stage.filters.join(", "))
                .collect();
            lines.push(format!(
                "{code} {name} ({description}) -> {output}",
                code = entry.code,
                name = entry.name,
                description = entry.description,
                output = entry.output,
            ));
            lines.push(format!(
                "    {} | append {} random bytes",
                stages.join(" | "),
                self.hash_suffix_bytes
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for entry in self {
            lines.push(format!(
                "[{status}] {name}: {detail}",
                status = entry.status,
                name = entry.name,
                detail = entry.detail
            ));
        }
        lines.join("\n")
    }
}
