//! On-demand content fetch.

use shelf_engine::{Command, EngineEvent, SyncClient};
use shelf_protocol::{ContentKind, RecordId};

/// Fetches one record's content, skipping the network if the local
/// copy is fresh.
pub async fn run(
    client: &SyncClient,
    id: &str,
    kind: ContentKind,
    token: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = client.subscribe();

    client.handle(Command::StoreReady).await;
    client
        .handle(Command::SetCredential {
            bearer: token.to_string(),
        })
        .await;
    client
        .handle(Command::RequestContent {
            id: RecordId::from(id),
            kind,
        })
        .await;

    let mut fetched = false;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::Error { reason } => eprintln!("error: {reason}"),
            EngineEvent::ContentFetched {
                id: fetched_id,
                kind: fetched_kind,
            } if fetched_id.as_str() == id && fetched_kind == kind => fetched = true,
            _ => {}
        }
    }

    if fetched {
        println!("fetched {kind} for {id}");
    }
    Ok(())
}
