//! seqgan CLI: the three training phases as subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use seqgan::train::{run_adversarial, run_dis_pretraining, run_gen_pretraining, TrainConfig};

#[derive(Parser)]
#[command(name = "seqgan", version, about = "Adversarial sequence-generation training")]
struct Cli {
    /// Path to the JSON training configuration.
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Directory holding `<kind>_<split>.json` dataset files.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Directory for checkpoints and records.
    #[arg(long, global = true, default_value = "checkpoints")]
    out_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// MLE-pretrain the generator (writes gen_states.json).
    PretrainGen,
    /// Pretrain the discriminator against the pretrained generator
    /// (requires gen_states.json, writes dis_states.json).
    PretrainDis,
    /// Adversarial phase (requires gen_states.json and dis_states.json,
    /// writes seqgan_states.json).
    Adversarial,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = TrainConfig::from_file(&cli.config).and_then(|config| match cli.command {
        Command::PretrainGen => run_gen_pretraining(&config, &cli.data_dir, &cli.out_dir),
        Command::PretrainDis => run_dis_pretraining(&config, &cli.data_dir, &cli.out_dir),
        Command::Adversarial => run_adversarial(&config, &cli.data_dir, &cli.out_dir),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
