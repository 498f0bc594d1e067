//! `run-agent` — a minimal interactive CLI for the incident-response
//! engine (§6 "a minimal CLI is in scope, used for local testing and
//! demos... not a replacement for the HTTP surface").
//!
//! Reads operator messages from stdin, runs one turn per line through the
//! same [`apron_marshal::graph::run_turn`] the HTTP surface calls, and
//! prints each node's progress followed by the final answer.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use apron_marshal::config::EngineConfig;
use apron_marshal::graph::{run_turn, GraphDeps};
use apron_marshal::llm::TemplateBackend;
use apron_marshal::scenario::ScenarioRegistry;
use apron_marshal::tools::context::{NullProviders, ToolContext};
use apron_marshal::tools::ToolRegistry;
use apron_marshal::topology::{PropagationTable, Topology};
use apron_marshal::types::{SessionState, TopologyFile};

#[derive(Parser, Debug)]
#[command(name = "run-agent")]
#[command(about = "Interactive incident-response session over stdin/stdout")]
struct CliArgs {
    /// Scenario descriptor directory.
    #[arg(long, default_value = "scenarios")]
    scenarios_dir: String,

    /// Scenario id to start in; auto-identified from the first message if omitted.
    #[arg(long)]
    scenario: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string())))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = EngineConfig::load();
    apron_marshal::config::init(config);
    let config = apron_marshal::config::get();

    let scenarios = ScenarioRegistry::load(args.scenarios_dir.clone())
        .with_context(|| format!("loading scenarios from {}", args.scenarios_dir))?;
    let topology = Topology::from_file(TopologyFile::default()).expect("empty topology never fails to build");

    let ctx = Arc::new(ToolContext {
        topology: Arc::new(topology),
        propagation_table: Arc::new(PropagationTable::default()),
        cleanup_time_table: Arc::new(apron_marshal::tools::context::CleanupTimeTable::default()),
        delay_table: Arc::new(apron_marshal::tools::context::DelayTable::default()),
        flight_data: Arc::new(NullProviders),
        weather: Arc::new(NullProviders),
        aircraft_info: Arc::new(NullProviders),
        scenario: Arc::new(scenarios),
        llm: Arc::new(TemplateBackend),
    });

    let registry = Arc::new(ToolRegistry::with_default_tools());

    println!("apron-marshal run-agent — type an incident report, Ctrl-D to exit.");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut state: Option<SessionState> = None;

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let message = line.trim();
        if message.is_empty() {
            print!("> ");
            io::stdout().flush().ok();
            continue;
        }

        let scenario_id = match &state {
            Some(existing) => existing.scenario_type.clone(),
            None => args.scenario.clone().unwrap_or_else(|| ctx.scenario.identify(message)),
        };
        let Some(scenario) = ctx.scenario.get(&scenario_id) else {
            eprintln!("unknown scenario: {scenario_id}");
            print!("> ");
            io::stdout().flush().ok();
            continue;
        };

        let mut session = state.take().unwrap_or_else(|| SessionState::new(apron_marshal::storage::new_session_id(), scenario_id.clone()));

        let deps = GraphDeps {
            llm: ctx.llm.clone(),
            registry: registry.clone(),
            scenario,
            ctx: ctx.clone(),
            recursion_limit: config.recursion_limit,
        };

        let events = run_turn(&deps, &mut session, message).await;
        for event in &events {
            if let Some(thought) = &event.current_thought {
                println!("  [{}] thought: {thought}", event.node);
            }
            if let Some(action) = &event.current_action {
                let input = event.current_action_input.as_ref().map(serde_json::Value::to_string).unwrap_or_default();
                println!("  [{}] action: {action} {input}", event.node);
            }
            if let Some(observation) = &event.current_observation {
                println!("  [{}] observation: {observation}", event.node);
            }
        }
        if let Some(answer) = &session.final_answer {
            println!("\n{answer}\n");
        }
        if session.is_complete {
            println!("[session complete: {}]", session.session_id);
            state = None;
        } else {
            state = Some(session);
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    println!("\ngoodbye.");
    Ok(())
}
