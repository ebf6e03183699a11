/// WebSocket module
///
/// Realtime surface of the messaging core: one session actor per socket,
/// each driving a delivery engine for the authenticated user.
///
/// - Message protocol (`ClientMessage` & `ServerMessage`)
/// - Session actor (one per connection)
/// - HTTP handler (upgrades HTTP to WebSocket)
/// - Session registry (live sockets per user)
pub mod handler;
pub mod message;
pub mod registry;
pub mod session;
