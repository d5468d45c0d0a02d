use serde_json::{Map, json};

use chat_store::{ConversationStore, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = StoreConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export SERVICE_URL=https://<project>.example.co");
        eprintln!("  export SERVICE_ACCESS_KEY=<anon key>");
        std::process::exit(1);
    });

    eprintln!("💬 Chat Store v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Service: {}", config.url);

    let store = ConversationStore::connect(&config)?;

    let user_id = format!("user_{}", chrono::Utc::now().timestamp());

    // ── Register user ───────────────────────────────────────────────
    let mut extra = Map::new();
    extra.insert("email".to_string(), json!("demo@example.com"));
    store.upsert_user(&user_id, "Demo User", extra).await;

    // ── Conversation ────────────────────────────────────────────────
    store
        .save_message(&user_id, "What are your opening hours?", false)
        .await;
    store
        .save_message(&user_id, "We are open from 9am to 6pm.", true)
        .await;

    let limit = 10;
    let history = store.get_history(&user_id, limit).await;
    eprintln!("   History ({} of max {limit}):", history.len());
    for msg in &history {
        let who = if msg.is_bot { "bot" } else { "user" };
        eprintln!("     [{}] {}: {}", msg.timestamp.to_rfc3339(), who, msg.body);
    }

    // ── Context ─────────────────────────────────────────────────────
    store
        .save_context(&user_id, &json!({"topic": "hours", "intent": "question"}))
        .await;

    // Independent calls may run concurrently.
    let (context, hits) = futures::join!(
        store.get_context(&user_id),
        store.search_knowledge("opening hours"),
    );
    eprintln!("   Context: {}", context.unwrap_or_default());
    eprintln!("   Knowledge hits: {}", hits.len());

    Ok(())
}
