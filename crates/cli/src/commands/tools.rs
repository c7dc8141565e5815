//! `shopwire tools` - List the tools the configured servers expose.

use shopwire_config::AppConfig;
use shopwire_tools::{ToolCatalog, bindings_from_config};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.tool_servers.is_empty() {
        println!("No tool servers configured.");
        println!("Add a [[tool_servers]] entry to {}", AppConfig::config_dir().join("config.toml").display());
        return Ok(());
    }

    let catalog = ToolCatalog::resolve(&bindings_from_config(&config.tool_servers)).await;
    println!("{} tool(s) from {} server(s):", catalog.len(), config.tool_servers.len());
    for tool in catalog.descriptors() {
        println!("  {:<28} {}", tool.name, tool.description);
    }

    Ok(())
}
