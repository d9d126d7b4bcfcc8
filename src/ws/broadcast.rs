use tracing::warn;
use uuid::Uuid;

use super::registry::RoomRegistry;

/// Deliver `payload` to every other live connection bound to `document_id`.
///
/// Fan-out runs over an immutable snapshot of the room taken up front, so
/// concurrent binds/unbinds never disturb an in-flight broadcast. Delivery
/// is at-most-once, best-effort: a recipient whose socket died between the
/// snapshot and the send is logged and skipped, never reported back to the
/// sender.
pub async fn broadcast_to_room(
    registry: &RoomRegistry,
    document_id: &str,
    excluding: Uuid,
    payload: &str,
) {
    let targets = registry.broadcast_targets(document_id, excluding).await;

    for target in targets {
        if let Err(e) = target.send_text(payload.to_string()) {
            warn!(
                "Dropping broadcast for connection {} on document {}: {}",
                target.id, document_id, e
            );
        }
    }
}
