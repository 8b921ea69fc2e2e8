//! Mirror status display.

use shelf_engine::SyncClient;
use shelf_store::{FileRecordStore, RecordStore};

/// Prints mirror and queue counts.
pub fn run(
    client: &SyncClient,
    store: &FileRecordStore,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = store.get_all()?;
    let unread = records.iter().filter(|r| !r.remote.is_read).count();
    let deleted = records.iter().filter(|r| r.remote.is_deleted).count();
    let downloaded = records
        .iter()
        .filter(|r| r.primary.version.is_some())
        .count();

    println!("Mirror Status");
    println!("=============");
    println!("  records:         {}", records.len());
    println!("  unread:          {unread}");
    println!("  deleted:         {deleted}");
    println!("  with content:    {downloaded}");
    println!("  pending updates: {}", client.pending_updates().len());

    Ok(())
}
