// Opportunistic relay — hand queued frames to a neighbouring station

use std::fmt::Display;

/// Forward every queued frame through `forward`
///
/// Frames that were forwarded are removed; frames whose forward failed stay
/// queued in their original order. Returns the number forwarded.
pub fn opportunistic_relay<F, E>(queue: &mut Vec<Vec<u8>>, mut forward: F) -> usize
where
    F: FnMut(&[u8]) -> Result<(), E>,
    E: Display,
{
    let before = queue.len();
    queue.retain(|frame| match forward(frame) {
        Ok(()) => false,
        Err(e) => {
            tracing::debug!(len = frame.len(), error = %e, "Relay forward failed, keeping frame");
            true
        }
    });
    let forwarded = before - queue.len();
    if forwarded > 0 {
        tracing::info!(forwarded, remaining = queue.len(), "Relayed queued frames");
    }
    forwarded
}
