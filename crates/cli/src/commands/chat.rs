//! `shopwire chat` - Send one message and stream the reply.

use shopwire_agent::{ChatRequest, Orchestrator, StreamEvent};
use shopwire_config::AppConfig;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(
    message: String,
    conversation: Option<String>,
    persona: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early - give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY=sk-...           (OpenAI)");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-... (OpenRouter)");
        eprintln!("    SHOPWIRE_API_KEY=...            (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config).await?);

    let mut request = ChatRequest::new(message);
    request.conversation_id = conversation;
    request.prompt_type = persona;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut turn = orchestrator.start_turn(request, cancel.clone());
    let mut stdout = std::io::stdout();
    let mut failure = None;

    while let Some(event) = turn.next_event().await {
        match event {
            StreamEvent::Id { conversation_id } => {
                eprintln!("  [conversation {conversation_id}]");
            }
            StreamEvent::Chunk { chunk } => {
                print!("{chunk}");
                stdout.flush()?;
            }
            StreamEvent::MessageComplete { message } => {
                if !message.content.is_empty() {
                    println!();
                }
            }
            StreamEvent::ToolUse { name, arguments, .. } => {
                eprintln!("  [tool] {name} {arguments}");
            }
            StreamEvent::NewMessage { message } => {
                let status = if message.is_error { "failed" } else { "done" };
                eprintln!("  [tool] {status}");
            }
            StreamEvent::AuthRequired { name, message, .. } => {
                eprintln!("  [auth required] {name}: {message}");
            }
            StreamEvent::ProductResults { products } => {
                println!();
                for product in products {
                    let mut price = product.price.clone().unwrap_or_else(|| "-".into());
                    if let Some(was) = &product.compare_at_price {
                        price.push_str(&format!(", was {was}"));
                    }
                    if product.available == Some(false) {
                        price.push_str(", sold out");
                    }
                    let link = product.link.as_deref().unwrap_or("");
                    println!("  • {} ({price}) {link}", product.title);
                }
            }
            StreamEvent::EndTurn => {}
            StreamEvent::Error { error } => failure = Some(error),
        }
    }

    orchestrator.flush().await;

    if cancel.is_cancelled() {
        eprintln!("  [cancelled]");
    }
    match failure {
        Some(error) => Err(format!("Turn failed: {error}").into()),
        None => Ok(()),
    }
}
