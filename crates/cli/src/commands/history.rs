//! `shopwire history` - Print a conversation's stored messages.

use shopwire_config::AppConfig;
use shopwire_core::message::ConversationId;

pub async fn run(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = shopwire_store::open_store(&config.store).await?;

    let rows = store.list(&ConversationId::from(id)).await?;
    if rows.is_empty() {
        println!("No messages stored for conversation {id} ({} store).", store.name());
        return Ok(());
    }

    for row in rows {
        let text = row.content.to_text();
        let label = match &row.tool_call_id {
            Some(call) => format!("{} [{call}]", row.role.as_str()),
            None => row.role.as_str().to_string(),
        };
        println!("{}  {label:<12} {text}", row.created_at.format("%Y-%m-%d %H:%M:%S"));
    }

    Ok(())
}
