use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mindorbit::chat::ChatSession;
use mindorbit::context::ContextSelector;
use mindorbit::graph::{ForceSimulation, LayoutParams};
use mindorbit::llm::{build_model, KnowledgeModel};
use mindorbit::server::{AppState, HttpServer};
use mindorbit::store::open_store;
use mindorbit::{Config, ItemType, KnowledgeBase, KnowledgeItem};

#[derive(Parser, Debug)]
#[command(name = "mindorbit")]
#[command(about = "Capture knowledge, see how it relates, and ask questions about it", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Override http_server.port from config.toml
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Capture a note or link and enrich it with the model
    Add {
        /// Item type: text or url
        #[arg(long = "type", default_value = "text")]
        item_type: ItemType,
        #[arg(required = true)]
        content: Vec<String>,
    },
    /// List items, oldest first
    List,
    /// Show one item in full
    Show { id: String },
    /// Delete an item
    Delete { id: String },
    /// Ask Orbit a question about your notes
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Print the relation graph as JSON
    Graph,
    /// Settle the force layout and print node positions as JSON
    Layout {
        #[arg(long, default_value = "300")]
        ticks: usize,
    },
    /// Node and category counts
    Stats,
    /// Resurface a random item
    Rediscover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.mindorbit.log_level.as_str()),
    )
    .init();

    log::debug!("MindOrbit v{} using {}", env!("CARGO_PKG_VERSION"), config.data_path().display());

    let store = open_store(&config).await.context("Failed to open item store")?;
    let mut kb = KnowledgeBase::load(store).await?;

    match cli.command {
        Command::Serve { port } => {
            let model = build_model(&config.model, config.api_key())?;
            let state = AppState::new(kb, model, selector(&config), &config.layout);
            let server = HttpServer::new(state, &config.http_server);
            server.run(port.unwrap_or(config.http_server.port)).await?;
        }
        Command::Add { item_type, content } => {
            let model = build_model(&config.model, config.api_key())?;
            let item = kb.capture(model.as_ref(), &content.join(" "), item_type).await?;
            print_item(&item);
        }
        Command::List => {
            for item in kb.sorted_by_created() {
                println!("{}  [{}] {}", item.id, item.category, item.title);
            }
        }
        Command::Show { id } => {
            let item = kb
                .get(&id)
                .ok_or_else(|| anyhow::anyhow!("Knowledge item not found: {}", id))?;
            print_item(item);
        }
        Command::Delete { id } => {
            let removed = kb.delete(&id).await?;
            println!("Deleted \"{}\"", removed.title);
        }
        Command::Ask { question } => {
            let model: Arc<dyn KnowledgeModel> = build_model(&config.model, config.api_key())?;
            let mut chat = ChatSession::new(selector(&config), kb.len());
            let reply = chat.ask(model.as_ref(), &question.join(" "), kb.items()).await?;
            println!("{}", reply.text);
        }
        Command::Graph => {
            println!("{}", serde_json::to_string_pretty(&kb.graph())?);
        }
        Command::Layout { ticks } => {
            let graph = kb.graph();
            let mut sim = ForceSimulation::new(&graph, LayoutParams::from(&config.layout));
            let run = sim.settle(ticks);
            log::info!("Layout ran {} ticks (alpha {:.4})", run, sim.alpha());
            println!("{}", serde_json::to_string_pretty(&sim.positions())?);
        }
        Command::Stats => {
            let stats = kb.stats();
            println!("{} nodes, {} categories", stats.nodes, stats.categories);
        }
        Command::Rediscover => match kb.random_item(&mut rand::thread_rng()) {
            Some(item) => {
                println!("Rediscover: {}", item.title);
                println!("{}", item.summary);
            }
            None => println!("Nothing to rediscover yet. Add some knowledge first."),
        },
    }

    Ok(())
}

fn selector(config: &Config) -> ContextSelector {
    ContextSelector::new(config.chat.match_policy, config.chat.context_limit)
}

fn print_item(item: &KnowledgeItem) {
    println!("{} ({})", item.title, item.item_type);
    println!("id:       {}", item.id);
    println!("category: {}", item.category);
    println!("tags:     {}", item.tags.join(", "));
    println!();
    println!("{}", item.summary);
    println!();
    println!("{}", item.content);
}
