//! Pending-update listing.

use shelf_engine::SyncClient;

/// Lists undelivered mutations in delivery order.
pub fn run(client: &SyncClient) -> Result<(), Box<dyn std::error::Error>> {
    let pending = client.pending_updates();

    if pending.is_empty() {
        println!("No pending updates.");
        return Ok(());
    }

    println!("Pending Updates");
    println!("===============");
    for (index, update) in pending.iter().enumerate() {
        println!(
            "  {:>3}. {} {}",
            index + 1,
            update.describe(),
            update.record_id()
        );
    }

    Ok(())
}
