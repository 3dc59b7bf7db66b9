use clap::{Args, Parser, Subcommand};
use living_noise_solver::{
    server::{self, AppState},
    AnalysisConfig, AudioEventModel, AudioProcessor, ClassMap, NoiseAnalyzer, NoiseClassifier,
    NoiseResponse, Result, VoiceAnalyzer, VoiceResponse,
};
use log::{error, info};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "living-noise-solver",
    about = "Voice-to-animal and ambient noise analysis service",
    version
)]
struct Cli {
    /// ONNX audio event model (YAMNet)
    #[arg(long, env = "NOISE_SOLVER_MODEL", default_value = "models/yamnet.onnx")]
    model: PathBuf,

    /// CSV mapping model output indices to class names
    #[arg(long, env = "NOISE_SOLVER_CLASS_MAP", default_value = "models/yamnet_class_map.csv")]
    class_map: PathBuf,

    /// JSON file overriding analysis parameters
    #[arg(long, env = "NOISE_SOLVER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD_MB: usize = 25;

#[derive(Args, Debug, PartialEq)]
struct ServeArgs {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Largest accepted upload in megabytes
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_MB)]
    max_upload_mb: usize,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve(ServeArgs),
    /// Map a voice recording to an animal sound
    Voice { file: PathBuf },
    /// Classify ambient noise in an audio file
    Noise { file: PathBuf },
    /// Record from the microphone, then run the voice analysis
    #[cfg(feature = "microphone")]
    Record {
        #[arg(short, long, default_value_t = 5.0)]
        seconds: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };

    match cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    {
        Command::Serve(args) => {
            let noise = load_noise_analyzer(&config, &cli.model, &cli.class_map)?;
            let max_pending = config.max_pending_inference;
            let state = Arc::new(AppState::new(VoiceAnalyzer::new(config), noise, max_pending));
            let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
            server::serve(addr, state, args.max_upload_mb * 1024 * 1024).await?;
        }
        Command::Voice { file } => {
            let waveform = AudioProcessor::new(config.model_sample_rate).load_audio_file(&file)?;
            info!(
                "Loaded {} ({} samples, {:.2} seconds)",
                file.display(),
                waveform.len(),
                waveform.duration()
            );
            let response = VoiceResponse::from(VoiceAnalyzer::new(config).analyze_waveform(&waveform));
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Noise { file } => {
            let analyzer = load_noise_analyzer(&config, &cli.model, &cli.class_map)?
                .ok_or_else(|| anyhow::anyhow!("noise model could not be loaded"))?;
            let waveform = AudioProcessor::new(config.model_sample_rate).load_audio_file(&file)?;
            let response = NoiseResponse::from(analyzer.analyze_waveform(waveform));
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        #[cfg(feature = "microphone")]
        Command::Record { seconds } => {
            let waveform = tokio::task::spawn_blocking(move || {
                living_noise_solver::recorder::record_clip(std::time::Duration::from_secs_f64(seconds))
            })
            .await??;
            let response = VoiceResponse::from(VoiceAnalyzer::new(config).analyze_waveform(&waveform));
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

/// The class map is required; a model that fails to load only disables
/// the noise endpoint.
fn load_noise_analyzer(
    config: &AnalysisConfig,
    model_path: &Path,
    class_map_path: &Path,
) -> Result<Option<NoiseAnalyzer>> {
    let classes = Arc::new(ClassMap::load(class_map_path)?);
    info!("Loaded {} class names from {}", classes.len(), class_map_path.display());

    match NoiseClassifier::new(model_path) {
        Ok(classifier) => {
            let model: Arc<dyn AudioEventModel> = Arc::new(classifier);
            Ok(Some(NoiseAnalyzer::new(config.clone(), model, classes)))
        }
        Err(err) => {
            error!("Failed to load noise model {}: {:#}", model_path.display(), err);
            Ok(None)
        }
    }
}
