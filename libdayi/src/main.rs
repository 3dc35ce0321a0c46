//! libdayi command-line front end
//!
//! Usage:
//!   libdayi --data-dir data decode dj ev ev c8 --top-k 3
//!   libdayi next 明 -n 3
//!   libdayi learn --original 明天天器 --final 明天天氣
//!   libdayi weights export --output weights.json
//!   libdayi interactive

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use libdayi::{convert_artifacts, DayiConfig, Engine};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "libdayi")]
#[command(about = "Dàyì code sentence decoder")]
struct Args {
    /// Directory holding the dictionary, the n-gram model and the user store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a sequence of codes into sentences
    Decode {
        #[arg(required = true)]
        codes: Vec<String>,

        /// Number of alternatives (defaults to the configured top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Rank the candidates of one code after a preceding character
    Rank {
        code: String,

        #[arg(long)]
        prev: Option<String>,
    },
    /// Remember a chosen candidate so it ranks first for its code
    Select { code: String, character: String },
    /// Suggest characters that commonly follow a character
    Next {
        prev: String,

        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
    /// Learn from a corrected sentence
    Learn {
        /// Sentence the engine produced
        #[arg(long)]
        original: String,

        /// Sentence the user committed
        #[arg(long = "final")]
        corrected: String,
    },
    /// Inspect or edit learned weights
    Weights {
        #[command(subcommand)]
        action: WeightsAction,
    },
    /// Write the binary (.fst/.bincode) forms of the JSON artifacts
    Convert,
    /// Read code lines from stdin and decode them one by one
    Interactive,
}

#[derive(Subcommand, Debug)]
enum WeightsAction {
    /// Print weights as JSON
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load weights from a JSON export
    Import { file: PathBuf },
    /// Remove every learned weight and selection order
    Clear,
    /// Show weight statistics
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Convert => {
            let (codes, bigrams) = convert_artifacts(&config).with_context(|| {
                format!("converting artifacts in {}", config.data_dir().display())
            })?;
            println!("Converted {} codes and {} bigrams", codes, bigrams);
        }
        Command::Decode { codes, top_k } => {
            let engine = load_engine(&config)?;
            let k = top_k.unwrap_or(engine.config().top_k);
            let predictions = engine.decode_input_top_k(&codes.join(" "), k)?;
            for (i, p) in predictions.iter().enumerate() {
                println!("{}. {} (score: {:.4})", i + 1, p.sentence, p.score);
            }
        }
        Command::Rank { code, prev } => {
            let engine = load_engine(&config)?;
            let ranked = engine.rank_candidates(prev.as_deref(), &code)?;
            for (i, c) in ranked.iter().enumerate() {
                println!("{}. {} (score: {:.4})", i + 1, c.candidate.character, c.score);
            }
        }
        Command::Select { code, character } => {
            let engine = load_engine(&config)?;
            let order = engine.record_selection(&code, character.trim())?;
            println!("{}: {}", code, order.join(" "));
        }
        Command::Next { prev, count } => {
            let engine = load_engine(&config)?;
            let next = engine.next_characters(&prev, count);
            if next.is_empty() {
                println!("(no continuations for {})", prev.trim());
            }
            for (i, (c, n)) in next.iter().enumerate() {
                println!("{}. {} (count: {})", i + 1, c, n);
            }
        }
        Command::Learn { original, corrected } => {
            let engine = load_engine(&config)?;
            let events = engine.record_sentence_correction(&original, &corrected);
            println!("Recorded {} correction(s)", events.len());
            for ev in &events {
                println!("  {}: {} -> {}", ev.prev, ev.wrong, ev.right);
            }
        }
        Command::Weights { action } => run_weights(&load_engine(&config)?, action)?,
        Command::Interactive => run_interactive(&load_engine(&config)?)?,
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<DayiConfig> {
    let mut config = match &args.config {
        Some(path) => DayiConfig::load_toml(path)
            .map_err(|e| anyhow!("Failed to load config {}: {}", path.display(), e))?,
        None => DayiConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn load_engine(config: &DayiConfig) -> Result<Engine> {
    Engine::from_config(config)
        .with_context(|| format!("loading engine from {}", config.data_dir().display()))
}

fn run_weights(engine: &Engine, action: WeightsAction) -> Result<()> {
    match action {
        WeightsAction::Export { output } => {
            let json = engine.export_weights_json()?;
            match output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", json),
            }
        }
        WeightsAction::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let count = engine.import_weights_json(&content)?;
            println!("Imported {} weight(s)", count);
        }
        WeightsAction::Clear => {
            engine.clear_weights()?;
            println!("Cleared all learned weights");
        }
        WeightsAction::Stats => {
            let stats = engine.weight_stats();
            println!("entries:        {}", stats.count);
            println!("total |weight|: {:.4}", stats.total_weight);
            println!("mean |weight|:  {:.4}", stats.avg_weight);
            println!("code orders:    {}", stats.preferences);
        }
    }
    Ok(())
}

/// One line of codes per sentence. A line `#N` commits alternative N of the
/// last prediction (digits alone are Dàyì keys).
fn run_interactive(engine: &Engine) -> Result<()> {
    let mut session = engine.session();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(choice) = input.strip_prefix('#') {
            let choice = choice.trim().parse::<usize>().unwrap_or(0);
            if choice == 0 || choice > session.predictions().len() {
                println!("  → no alternative {}", choice);
                continue;
            }
            for _ in 1..choice {
                session.next_alternative();
            }
            let sentence = session.commit()?;
            println!("  ✓ {}", sentence);
            continue;
        }

        session.cancel();
        let codes = match engine.parser().parse(input) {
            Ok(codes) => codes,
            Err(e) => {
                println!("  → {}", e);
                continue;
            }
        };
        if let Err(e) = codes.iter().try_for_each(|code| session.push_code(code)) {
            session.cancel();
            println!("  → {}", e);
            continue;
        }

        let predictions = session.predict()?;
        for (i, p) in predictions.iter().enumerate() {
            println!("  {}. {} (score: {:.4})", i + 1, p.sentence, p.score);
        }
        stdout.flush()?;
    }
    Ok(())
}
