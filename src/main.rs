use clap::Parser;

use gale::cli::{Cli, Command};
use gale::config::Config;
use gale::pipeline;
use gale::prompts::PromptRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    let registry = PromptRegistry::builtin();

    match cli.command {
        Command::Prepare {
            input,
            output,
            mode,
            expand_count,
        } => {
            pipeline::prepare(&registry, &input, &output, mode, expand_count).await?;
        }
        Command::Split {
            input,
            output_dir,
            batch_count,
        } => {
            pipeline::split(&input, &output_dir, batch_count).await?;
        }
        Command::Run {
            input,
            output,
            llm_url,
            model,
            concurrency,
            batch_size,
        } => {
            apply_overrides(&mut config, llm_url, model, concurrency);
            pipeline::run(&config, &input, &output, batch_size).await?;
        }
        Command::Collect { input, output } => {
            pipeline::collect(&input, &output).await?;
        }
        Command::Judge {
            input,
            output,
            k,
            samples,
            llm_url,
            model,
            concurrency,
        } => {
            apply_overrides(&mut config, llm_url, model, concurrency);
            pipeline::judge(&config, &registry, &input, &output, k, samples).await?;
        }
    }

    Ok(())
}

/// CLI flags win over config file and environment.
fn apply_overrides(
    config: &mut Config,
    llm_url: Option<String>,
    model: Option<String>,
    concurrency: Option<usize>,
) {
    if let Some(url) = llm_url {
        config.llm_url = url;
    }
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
    }
}
