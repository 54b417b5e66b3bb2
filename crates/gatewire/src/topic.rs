//! Topic naming shared by the gateway and its clients.

use crate::identity::Identity;

/// The gateway's request/response topic: `<uuid>-exec`.
pub fn exec_topic(gateway: &Identity) -> String {
    format!("{}-exec", gateway.uuid)
}

/// The `n`th listener topic allocated by a client: `<uuid>-listener-<n>`.
pub fn listener_topic(client: &Identity, n: u64) -> String {
    format!("{}-listener-{}", client.uuid, n)
}
