//! One-shot synchronization pass.

use shelf_engine::{Command, EngineEvent, SyncClient};
use shelf_store::{FileRecordStore, RecordStore};
use tracing::info;

/// Runs one full pass: pull, pre-fetch, and pending-update replay.
pub async fn run(
    client: &SyncClient,
    store: &FileRecordStore,
    token: &str,
    prefetch: bool,
    source_prefetch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Error { reason } => eprintln!("error: {reason}"),
                EngineEvent::ContentFetched { id, kind } => {
                    println!("  fetched {kind} for {id}");
                }
                _ => {}
            }
        }
    });

    client.handle(Command::SetPrefetch { enabled: prefetch }).await;
    client
        .handle(Command::SetSourcePrefetch {
            enabled: source_prefetch,
        })
        .await;
    client.handle(Command::StoreReady).await;

    info!("starting synchronization pass");
    client
        .handle(Command::SetCredential {
            bearer: token.to_string(),
        })
        .await;

    let stats = client.stats();
    println!("Synchronization complete");
    println!("  records mirrored:    {}", store.count()?);
    println!("  pages pulled:        {}", stats.pages_pulled);
    println!("  records merged:      {}", stats.records_merged);
    println!("  downloads completed: {}", stats.downloads_completed);
    println!("  downloads failed:    {}", stats.downloads_failed);
    println!("  updates delivered:   {}", stats.updates_delivered);
    println!("  updates pending:     {}", client.pending_updates().len());

    Ok(())
}
