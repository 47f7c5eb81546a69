use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::pipeline::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "gale",
    version,
    about = "Math-reasoning rollout and evaluation pipeline against a local chat-completions backend"
)]
pub struct Cli {
    /// TOML config file (default: ./gale.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render prompts onto problem rows and expand them for multi-sample rollout.
    Prepare {
        /// Input problems (JSONL, one object with `question` per line).
        #[arg(short, long)]
        input: PathBuf,
        /// Output path for prepared rows.
        #[arg(short, long)]
        output: PathBuf,
        /// Prompt template selection.
        #[arg(short, long, value_enum, default_value = "base")]
        mode: Mode,
        /// Copies of each problem to emit.
        #[arg(short, long, default_value_t = 32)]
        expand_count: usize,
    },

    /// Shard a JSONL file into equal batch files.
    Split {
        #[arg(short, long)]
        input: PathBuf,
        /// Directory receiving batch_<N>.jsonl files.
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(short, long, default_value_t = 5)]
        batch_count: usize,
    },

    /// Dispatch a batch file to the backend and write rows augmented with
    /// `llm_output` / `error_info`.
    Run {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Override the configured chat-completions URL.
        #[arg(long)]
        llm_url: Option<String>,
        /// Override the configured model name.
        #[arg(long)]
        model: Option<String>,
        /// Override the configured concurrency limit.
        #[arg(long)]
        concurrency: Option<usize>,
        /// Process the file in sequential chunks of this size.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Parse structured outputs into judgeable answer records.
    Collect {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Score answer equivalence with an LLM judge and write avg@k accuracies.
    Judge {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Rollouts per problem; consecutive groups of k verdicts are averaged.
        #[arg(short = 'k', long, default_value_t = 32)]
        k: usize,
        /// Judge samples drawn per answer pair.
        #[arg(long, default_value_t = 3)]
        samples: usize,
        #[arg(long)]
        llm_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "gale",
            "run",
            "-i",
            "batch_0.jsonl",
            "-o",
            "batch_0_output.jsonl",
            "--llm-url",
            "http://127.0.0.1:7373/v1/chat/completions",
            "--concurrency",
            "64",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                llm_url,
                concurrency,
                batch_size,
                ..
            } => {
                assert_eq!(
                    llm_url.as_deref(),
                    Some("http://127.0.0.1:7373/v1/chat/completions")
                );
                assert_eq!(concurrency, Some(64));
                assert_eq!(batch_size, None);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn prepare_defaults() {
        let cli =
            Cli::try_parse_from(["gale", "prepare", "-i", "in.jsonl", "-o", "out.jsonl"]).unwrap();
        match cli.command {
            Command::Prepare {
                mode, expand_count, ..
            } => {
                assert_eq!(mode, Mode::Base);
                assert_eq!(expand_count, 32);
            }
            other => panic!("expected prepare, got {other:?}"),
        }
    }

    #[test]
    fn judge_short_k() {
        let cli = Cli::try_parse_from([
            "gale", "judge", "-i", "pairs.jsonl", "-o", "acc.jsonl", "-k", "8",
        ])
        .unwrap();
        match cli.command {
            Command::Judge { k, samples, .. } => {
                assert_eq!(k, 8);
                assert_eq!(samples, 3);
            }
            other => panic!("expected judge, got {other:?}"),
        }
    }
}
