use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Relay: one client for every OpenAI-compatible provider
#[derive(Debug, Parser)]
#[command(name = "relay", about = "Talk to OpenAI-compatible model providers")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml", env = "RELAY_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the provider's chat models
    Models(ProviderArgs),
    /// Stream a chat completion to stdout
    Chat(ChatArgs),
    /// Generate a JSON object matching a schema
    Object(ObjectArgs),
    /// Generate or edit an image
    Image(ImageArgs),
}

#[derive(Debug, ClapArgs)]
pub struct ProviderArgs {
    /// Provider name from the configuration file
    #[arg(short, long)]
    pub provider: String,
}

#[derive(Debug, ClapArgs)]
pub struct ChatArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    #[arg(short, long)]
    pub model: String,

    /// Request a single complete response instead of a stream
    #[arg(long)]
    pub no_stream: bool,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Print raw SSE frames instead of text
    #[arg(long)]
    pub sse: bool,

    pub prompt: String,
}

#[derive(Debug, ClapArgs)]
pub struct ObjectArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    #[arg(short, long)]
    pub model: String,

    /// JSON file holding `{ name, schema, ... }`
    #[arg(long)]
    pub schema: PathBuf,

    pub prompt: String,
}

#[derive(Debug, ClapArgs)]
pub struct ImageArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    #[arg(short, long)]
    pub model: String,

    /// Input image to edit; repeat for several
    #[arg(long = "image-url")]
    pub image_urls: Vec<String>,

    /// Output size such as `1024x1024`
    #[arg(long)]
    pub size: Option<String>,

    pub prompt: String,
}
