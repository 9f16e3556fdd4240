use crate::config::Overrides;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional command to run; starts the chat UI when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Accept empty or whitespace-only messages
    #[arg(long, global = true)]
    pub allow_empty: bool,

    /// Where the chat UI writes its logs
    #[arg(long, global = true, default_value = "atelier.log")]
    pub log_file: PathBuf,
}

/// Generation settings; each overrides its GEMINI_* environment variable.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Gemini model name
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Sampling temperature, 0 to 2
    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff, 0 to 1
    #[arg(long, global = true)]
    pub top_p: Option<f32>,

    /// Top-k sampling cutoff
    #[arg(long, global = true)]
    pub top_k: Option<u32>,

    /// Maximum tokens in a reply
    #[arg(long, global = true)]
    pub max_output_tokens: Option<u32>,

    /// System instruction sent with every request
    #[arg(long, global = true)]
    pub system: Option<String>,

    /// Give up on a reply after this many seconds (0 waits forever)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

impl From<&ModelArgs> for Overrides {
    fn from(args: &ModelArgs) -> Self {
        Overrides {
            model: args.model.clone(),
            temperature: args.temperature,
            top_p: args.top_p,
            top_k: args.top_k,
            max_output_tokens: args.max_output_tokens,
            system_instruction: args.system.clone(),
            timeout_secs: args.timeout,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a one-off message and print the reply
    Ask {
        /// The message to send
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}
