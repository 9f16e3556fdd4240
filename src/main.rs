mod cli;
mod config;
mod conversation;
mod llm;
mod logging;
mod session;
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::{ModelConfig, Overrides};
use session::{ChatSession, SubmissionPolicy, TurnOutcome};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let overrides = Overrides::from(&cli.model);
    let policy = SubmissionPolicy {
        allow_empty: cli.allow_empty,
    };

    match cli.command {
        Some(command) => {
            logging::init_stderr()?;
            // Missing credentials stop the process before anything is sent
            let config = ModelConfig::from_env(&overrides).context("Invalid configuration")?;

            match command {
                Commands::Ask { message } => ask(&config, policy, &message.join(" ")).await?,
                Commands::Config => print_config(&config),
            }
        }
        None => {
            // Fail before the terminal switches to the alternate screen
            let config = ModelConfig::from_env(&overrides).context("Invalid configuration")?;
            logging::init_file(&cli.log_file)?;

            let client = llm::shared_client(&config);
            tui::run(client, policy, config.request_timeout).await?;
        }
    }

    Ok(())
}

async fn ask(config: &ModelConfig, policy: SubmissionPolicy, message: &str) -> Result<()> {
    let client = llm::shared_client(config);
    let mut session = ChatSession::new(policy);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let outcome = session
        .submit(message, client.as_ref(), &cancel, config.request_timeout)
        .await?;

    match outcome {
        TurnOutcome::Replied(reply) => {
            println!("{}", reply);
            Ok(())
        }
        TurnOutcome::Failed(err) => anyhow::bail!(err.user_message()),
    }
}

fn print_config(config: &ModelConfig) {
    let g = &config.generation;
    println!("model:              {}", config.model);
    println!("endpoint:           {}", config.base_url);
    println!("api key:            <set>");
    println!("temperature:        {}", g.temperature);
    println!("top_p:              {}", g.top_p);
    println!("top_k:              {}", g.top_k);
    println!("max_output_tokens:  {}", g.max_output_tokens);
    match config.request_timeout {
        Some(timeout) => println!("timeout:            {}s", timeout.as_secs()),
        None => println!("timeout:            none"),
    }
    println!("system instruction: {}", config.system_instruction.trim());
}
