use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use flux_studio_protocol::JobKind;

mod cli;
mod client;
mod config;
mod error;
mod gallery;
mod generate;
mod queue;
mod store;
mod ui;
mod version;

#[cfg(test)]
mod tests;

use cli::CliHandler;
use version::CURRENT_VERSION;

#[derive(Parser)]
#[command(
    name = "fluxstudio",
    about = "Image generation studio over a serverless Flux endpoint",
    long_about = "Flux Studio - generation, editing and gallery management from the terminal

OVERVIEW:
  This tool submits generation jobs to a serverless Flux endpoint, tracks
  them while they run, and keeps every finished image in a local gallery.

WORKFLOW:
  1. Login with your endpoint id and API key
  2. Generate, edit or detail images
  3. Browse and export results from the gallery

QUICK START:
  fluxstudio login                          # Store endpoint credentials
  fluxstudio generate \"a sunset portrait\"   # Run one generation job
  fluxstudio batch \"a sunset portrait\" -n 4 # Run four jobs back to back
  fluxstudio gallery list                   # Browse generated images
  fluxstudio status                         # Check credentials and endpoint health",
    version = CURRENT_VERSION,
    author = "Flux Studio Team",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate an image from a prompt
    #[command(aliases = &["gen"])]
    Generate(GenerateArgs),

    /// Edit an existing image guided by a prompt
    Edit(EditArgs),

    /// Run a face-detail pass over an existing image
    #[command(aliases = &["det"])]
    Detailer(DetailerArgs),

    /// Run several generate jobs sequentially
    Batch(BatchArgs),

    /// Show credentials and endpoint health
    #[command(aliases = &["st"])]
    Status,

    /// Store endpoint credentials
    Login(LoginArgs),

    /// Remove stored credentials
    Logout,

    /// Configure generation defaults
    #[command(aliases = &["cfg"])]
    Config(ConfigArgs),

    /// Browse and manage generated images
    #[command(aliases = &["gal"])]
    Gallery(GalleryArgs),

    /// Inspect jobs tracked in this session
    Queue(QueueArgs),

    /// Manage the active character profile
    #[command(aliases = &["char"])]
    Character(CharacterArgs),

    /// Manage prompt templates
    #[command(aliases = &["tpl"])]
    Template(TemplateArgs),
}

#[derive(Args)]
pub struct GenerateArgs {
    pub prompt: String,

    #[arg(long)]
    pub negative: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub steps: Option<u32>,

    #[arg(long)]
    pub seed: Option<i64>,

    /// Prompt template to merge in
    #[arg(short, long)]
    pub template: Option<String>,

    /// Reference image for face identity
    #[arg(long)]
    pub reference_image: Option<PathBuf>,

    #[arg(long)]
    pub pose_image: Option<PathBuf>,

    #[arg(long)]
    pub depth_image: Option<PathBuf>,

    #[arg(long)]
    pub canny_image: Option<PathBuf>,

    #[arg(long)]
    pub controlnet_strength: Option<f64>,

    #[arg(long)]
    pub upscale: bool,

    #[arg(long)]
    pub detail_daemon: bool,

    #[arg(long)]
    pub lora_url: Option<String>,

    #[arg(long)]
    pub lora_name: Option<String>,

    /// Ignore the active character profile
    #[arg(long)]
    pub no_character: bool,

    /// Block on /runsync instead of polling
    #[arg(long)]
    pub sync: bool,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct EditArgs {
    pub input_image: PathBuf,

    pub prompt: String,

    #[arg(long)]
    pub denoise: Option<f64>,

    #[arg(long)]
    pub steps: Option<u32>,

    #[arg(long)]
    pub seed: Option<i64>,

    #[arg(long)]
    pub upscale: bool,

    #[arg(long)]
    pub no_character: bool,

    #[arg(long)]
    pub sync: bool,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DetailerArgs {
    pub input_image: PathBuf,

    #[arg(long)]
    pub denoise: Option<f64>,

    #[arg(long)]
    pub scale_by: Option<f64>,

    #[arg(long)]
    pub seed: Option<i64>,

    #[arg(long)]
    pub sync: bool,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct BatchArgs {
    pub prompt: String,

    /// Number of jobs to run
    #[arg(short = 'n', long = "count", default_value_t = 4)]
    pub count: usize,

    #[arg(long)]
    pub negative: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub steps: Option<u32>,

    #[arg(long)]
    pub seed: Option<i64>,

    #[arg(short, long)]
    pub template: Option<String>,

    #[arg(long)]
    pub no_character: bool,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct LoginArgs {
    /// Endpoint id; prompted for when omitted
    pub endpoint_id: Option<String>,

    /// API key; prompted for when omitted
    #[arg(long)]
    pub api_key: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        steps: Option<u32>,
        #[arg(long)]
        seed: Option<i64>,
        #[arg(long)]
        denoise: Option<f64>,
        #[arg(long)]
        locale: Option<String>,
    },
    Reset,
}

#[derive(Args)]
pub struct GalleryArgs {
    #[command(subcommand)]
    pub command: GalleryCommand,
}

#[derive(Subcommand)]
pub enum GalleryCommand {
    /// List images, optionally filtered
    #[command(aliases = &["ls"])]
    List {
        /// Filter by job kind (generate, edit, detailer)
        #[arg(long)]
        kind: Option<JobKind>,
        #[arg(long)]
        favorites: bool,
        #[arg(long)]
        search: Option<String>,
    },
    /// Search prompts (shorthand for list --search)
    Search { query: String },
    /// Toggle the favorite mark on an image
    #[command(aliases = &["fav"])]
    Favorite { id: uuid::Uuid },
    /// Delete images by id
    #[command(aliases = &["rm"])]
    Remove { ids: Vec<uuid::Uuid> },
    /// Delete every image
    Clear {
        #[arg(short, long)]
        force: bool,
    },
    /// Write images as JPEG files
    Export {
        /// Specific ids; exports everything when omitted
        ids: Vec<uuid::Uuid>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Add images to a named collection
    Collect { name: String, ids: Vec<uuid::Uuid> },
    /// List collections
    Collections,
}

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommand,
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// List jobs tracked in this session
    #[command(aliases = &["ls"])]
    List,
    /// Drop finished jobs from the list
    Clear,
}

#[derive(Args)]
pub struct CharacterArgs {
    #[command(subcommand)]
    pub command: CharacterCommand,
}

#[derive(Subcommand)]
pub enum CharacterCommand {
    Show,
    Set {
        name: String,
        #[arg(long)]
        persona: Option<String>,
        #[arg(long)]
        face_lora: Option<String>,
        #[arg(long)]
        face_lora_strength: Option<f64>,
        /// "pulid" or "ip_adapter"
        #[arg(long)]
        face_mode: Option<String>,
        #[arg(long)]
        reference_image: Option<PathBuf>,
    },
    Clear,
}

#[derive(Args)]
pub struct TemplateArgs {
    #[command(subcommand)]
    pub command: TemplateCommand,
}

#[derive(Subcommand)]
pub enum TemplateCommand {
    #[command(aliases = &["ls"])]
    List,
    Add {
        name: String,
        prompt: String,
        #[arg(long)]
        negative: Option<String>,
    },
    #[command(aliases = &["rm"])]
    Remove { name: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(format!("fluxstudio={}", log_level));
    subscriber.init();

    let mut handler = CliHandler::new(None);

    if let Err(e) = handler.execute(cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
