mod estimate;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use futures::StreamExt;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use thoughttree_core::{GenerationConfig, Message, MessageRole, SearchConfig};
use thoughttree_engine::{prompts, SearchEngine, TerminalReason};
use thoughttree_llm::{LlmProvider, OllamaConfig, OllamaProvider};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "thoughttree")]
#[command(about = "Iterative-refinement reasoning REPL over a local Ollama model", long_about = None)]
#[command(version)]
struct Cli {
    /// Model served by the Ollama endpoint
    #[arg(short, long, env = "THOUGHTTREE_MODEL", default_value = "llama3.1:8b")]
    model: String,

    /// Base URL of the Ollama endpoint
    #[arg(
        long,
        env = "THOUGHTTREE_OLLAMA_URL",
        default_value = "http://localhost:11434"
    )]
    ollama_url: String,

    /// Context window advertised to the model, in tokens
    #[arg(long, default_value_t = 8192)]
    context_window: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Skip the startup model-availability probe
    #[arg(long)]
    skip_probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thoughttree=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let search_config = SearchConfig::from_env();

    let provider = Arc::new(OllamaProvider::new(OllamaConfig {
        model_name: cli.model.clone(),
        base_url: cli.ollama_url.clone(),
        timeout: Duration::from_secs(cli.timeout_secs),
    }));

    if !cli.skip_probe && !provider.is_available().await {
        anyhow::bail!(
            "model '{}' is not available at {} (pull it first, or pass --skip-probe)",
            cli.model,
            cli.ollama_url
        );
    }

    let generation = GenerationConfig {
        context_window: cli.context_window,
        ..Default::default()
    };
    let engine = SearchEngine::new(
        provider.clone(),
        search_config.clone(),
        generation.clone(),
    )?;

    // Externally owned, append-only transcript; the engine only ever
    // borrows it
    let mut history = vec![Message::system(prompts::SYSTEM_PROMPT)];

    clear_screen();
    let stdin = io::stdin();
    loop {
        print!("{} ", "user >".bold());
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        history.push(Message::user(line));
        if let Err(e) = run_turn(
            &engine,
            provider.as_ref(),
            &search_config,
            &generation,
            &mut history,
        )
        .await
        {
            // Abort the turn but keep the session; drop the dangling user
            // message so the transcript stays well-formed
            history.pop();
            eprintln!("{} {e:#}", "turn failed:".red().bold());
        }
    }

    Ok(())
}

async fn run_turn(
    engine: &SearchEngine,
    provider: &dyn LlmProvider,
    config: &SearchConfig,
    generation: &GenerationConfig,
    history: &mut Vec<Message>,
) -> Result<()> {
    clear_screen();
    println!("{}", "estimating reasoning depth...".dimmed());
    let budget = estimate::estimate_depth_budget(provider, history, config, generation).await?;
    println!("depth budget: {budget}");

    let mut thoughts = String::new();
    let mut final_score = 0.0;
    let mut final_reason = None;
    {
        let stream = engine.run(history.clone(), budget)?;
        futures::pin_mut!(stream);
        while let Some(snapshot) = stream.next().await {
            let snapshot = snapshot?;
            clear_screen();
            if snapshot.finished {
                thoughts = snapshot.thoughts.clone();
                final_score = snapshot.score;
                final_reason = snapshot.reason;
                println!(
                    "{} Q = {:.1} ({})",
                    "reasoning finished".green().bold(),
                    snapshot.score,
                    describe_reason(final_reason)
                );
                println!("\n{}", snapshot.thoughts);
            } else {
                println!("{} Q = {:.1}", "current best node".cyan(), snapshot.score);
                println!("{}", snapshot.thoughts.dimmed());
            }
        }
    }

    // The winning thought chain is substituted into the answer prompt in
    // place of the bare query
    let query = history.last().expect("turn has a query").content.clone();
    let mut transcript = history[..history.len() - 1].to_vec();
    transcript.push(Message::user(prompts::generation_prompt(&query, &thoughts)));

    println!("\n{}", "response:".bold());
    let mut answer = String::new();
    let mut chunks = provider.generate_chat_stream(&transcript, generation).await?;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        print!("{chunk}");
        io::stdout().flush()?;
        answer.push_str(&chunk);
    }
    println!();

    history.push(Message::assistant(format!("{thoughts}\n\n{answer}")));

    render_transcript(history);
    println!(
        "{} Q = {:.1} ({})",
        "finished reasoning with".dimmed(),
        final_score,
        describe_reason(final_reason)
    );
    Ok(())
}

fn describe_reason(reason: Option<TerminalReason>) -> &'static str {
    match reason {
        Some(TerminalReason::DefiniteCompletion) => "definite search completion",
        Some(TerminalReason::DiminishingReturns) => "diminishing returns",
        Some(TerminalReason::MaxDepthReached) => "maximum search depth reached",
        None => "search did not finish",
    }
}

fn render_transcript(history: &[Message]) {
    clear_screen();
    for message in history {
        if message.role == MessageRole::System {
            continue;
        }
        println!("{} {}", format!("{} >", message.role).bold(), message.content);
    }
}

fn clear_screen() {
    // ANSI wipe + cursor home, same effect as the platform clear commands
    print!("\x1b[2J\x1b[1;1H");
    let _ = io::stdout().flush();
}
