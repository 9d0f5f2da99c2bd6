//! Sends the same completion twice through the gateway; the second answer is
//! served from the cache.

use mindserver_sdk_rs::config::GatewayConfig;
use mindserver_sdk_rs::gateway::Gateway;
use mindserver_sdk_rs::llm::{CompletionRequest, Message};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    mindserver_sdk_rs::logger::init_logging("gateway-demo");

    let config = GatewayConfig::from_env()?;
    if config.settings(config.default_provider).api_key.is_none() {
        println!(
            "No API key for {}. Set it to run this example.",
            config.default_provider
        );
        return Ok(());
    }

    let gateway = Gateway::from_config(&config)?;
    let mut request = CompletionRequest::new(vec![Message::user(
        "Name one block you can mine with a wooden pickaxe.",
    )]);
    request.system_message = Some("Answer in five words or fewer.".to_string());

    for attempt in 1..=2 {
        let result = gateway.create_completion(&request).await?;
        println!(
            "#{} ({}): {}",
            attempt,
            if result.cached { "cached" } else { "fresh" },
            result.content
        );
    }
    Ok(())
}
