// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Command-line playground for the rethink coordination layer.
// Run with: cargo run -p rethink-sandbox -- <command>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rethink_core::event::{
    JobCompleted, JobProgress, JobStarted, JobStopped, PushOperationRequested, RedoRequested,
    UndoRequested,
};
use rethink_core::{CommandStack, CoreConfig, EventBus, Operation, TaskPool};
use rethink_procedural::{
    GeneratedModel, GenerationCancelRequested, GenerationRequested, GeneratorHub,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rethink-sandbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// RON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the task pool's worker count
    #[arg(short, long)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as RON
    Config,

    /// Apply a few edits, then undo and redo them through the bus
    History {
        /// Number of edits to apply
        #[arg(short, long, default_value = "3")]
        edits: u32,
    },

    /// Run a procedural generator and report its lifecycle
    Generate {
        /// Generator name
        #[arg(short, long, default_value = "lsystem")]
        algorithm: String,

        /// Generator parameters as JSON
        #[arg(short, long, default_value = "{}")]
        params: String,

        /// Publish a cancellation after this many milliseconds
        #[arg(long)]
        cancel_after: Option<u64>,
    },
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.task_pool.worker_count = Some(workers);
    }

    Builder::from_env(Env::default().default_filter_or(config.log_level.as_str())).init();

    match cli.command {
        Commands::Config => {
            println!("{}", config.to_ron_string()?);
            Ok(())
        }
        Commands::History { edits } => run_history(&config, edits),
        Commands::Generate {
            algorithm,
            params,
            cancel_after,
        } => run_generate(&config, algorithm, &params, cancel_after),
    }
}

fn run_history(config: &CoreConfig, edits: u32) -> Result<()> {
    let bus = Arc::new(EventBus::new());
    let history = CommandStack::with_config(bus.clone(), &config.history);
    let value = Arc::new(AtomicI64::new(0));

    for step in 1..=edits {
        let delta = i64::from(step);
        value.fetch_add(delta, Ordering::SeqCst);

        let (redo_value, undo_value) = (value.clone(), value.clone());
        bus.publish(PushOperationRequested {
            operation: Operation::new(
                format!("add {delta}"),
                move || {
                    redo_value.fetch_add(delta, Ordering::SeqCst);
                    Ok(())
                },
                move || {
                    undo_value.fetch_sub(delta, Ordering::SeqCst);
                    Ok(())
                },
            ),
        });
        log::info!("Applied 'add {delta}', value = {}", value.load(Ordering::SeqCst));
    }

    while history.can_undo() {
        let label = history.undo_label().unwrap_or_default();
        bus.publish(UndoRequested);
        log::info!("Undid '{label}', value = {}", value.load(Ordering::SeqCst));
    }
    while history.can_redo() {
        let label = history.redo_label().unwrap_or_default();
        bus.publish(RedoRequested);
        log::info!("Redid '{label}', value = {}", value.load(Ordering::SeqCst));
    }

    println!(
        "value = {} (undo: {}, redo: {})",
        value.load(Ordering::SeqCst),
        history.undo_stack_size(),
        history.redo_stack_size()
    );
    Ok(())
}

enum Outcome {
    Completed(JobCompleted<GeneratedModel>),
    Stopped,
}

fn run_generate(
    config: &CoreConfig,
    algorithm: String,
    params: &str,
    cancel_after: Option<u64>,
) -> Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(params).context("parameters must be valid JSON")?;

    let bus = Arc::new(EventBus::new());
    let pool = Arc::new(TaskPool::from_config(&config.task_pool)?);
    let hub = GeneratorHub::with_defaults(bus.clone(), pool, 0);
    log::info!("Available generators: {}", hub.names().join(", "));

    bus.subscribe(|e: &JobStarted| {
        println!("{} started ({})", e.job, e.name);
        Ok(())
    });
    bus.subscribe(|e: &JobProgress| {
        println!("{} {:>5.1}%", e.job, e.fraction * 100.0);
        Ok(())
    });
    let (tx, rx) = flume::unbounded();
    let done = tx.clone();
    bus.subscribe(move |e: &JobCompleted<GeneratedModel>| {
        let _ = done.send(Outcome::Completed(e.clone()));
        Ok(())
    });
    bus.subscribe(move |_: &JobStopped| {
        let _ = tx.send(Outcome::Stopped);
        Ok(())
    });

    bus.publish(GenerationRequested { algorithm, params });

    let outcome = match cancel_after {
        Some(ms) => match rx.recv_timeout(Duration::from_millis(ms)) {
            Ok(outcome) => outcome,
            Err(_) => {
                bus.publish(GenerationCancelRequested::default());
                rx.recv().context("generator vanished before reporting")?
            }
        },
        None => rx.recv().context("generator vanished before reporting")?,
    };

    match outcome {
        Outcome::Completed(done) if done.success => {
            if let Some(model) = done.payload {
                println!(
                    "{} completed: model {} with {} vertices, {} indices, {} tiles",
                    done.job,
                    model.id,
                    model.vertices.len(),
                    model.indices.len(),
                    model.tiles.len()
                );
            }
        }
        Outcome::Completed(done) => {
            println!(
                "{} failed: {}",
                done.job,
                done.error.unwrap_or_else(|| "unknown error".into())
            );
        }
        Outcome::Stopped => println!("generation stopped"),
    }
    Ok(())
}
