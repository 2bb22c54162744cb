//! Real-time signaling hub: the control plane for a many-to-many WebRTC
//! conferencing platform.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Hub                                    │
//! │              DashMap<room name, Arc<Room>>, lazily populated        │
//! │                                 │                                   │
//! │                     ┌───────────┴───────────┐                      │
//! │                     ▼                       ▼                      │
//! │                  Room "r1"               Room "r2"                 │
//! │           RwLock<{members, sharer}>  RwLock<{members, sharer}>      │
//! │              │         │                                           │
//! │              ▼         ▼                                           │
//! │      ClientSession   ClientSession     (non-owning from Room's      │
//! │        (u1)            (u2)             side: a room holds Arcs,    │
//! │      outbound mpsc   outbound mpsc      closing a session doesn't   │
//! │      read pump ──▶   read pump ──▶      destroy the room it left)  │
//! │      write pump      write pump                                    │
//! └──────┼──────────────────┼────────────────────────────────────────────
//!        ▼                  ▼
//!   WebSocket A        WebSocket B
//! ```
//!
//! A read pump decodes inbound envelopes and hands them to
//! [`dispatcher::dispatch`]. A write pump drains the session's bounded
//! outbound queue to the socket; enqueue is non-blocking, and a full queue
//! means the producer evicts the slow consumer rather than blocking
//! (spec.md §5). This mirrors the teacher's `stream::StreamManager`: a
//! registry of per-connection command channels, replaced wholesale here by
//! a registry of rooms holding per-connection outbound channels.

pub mod dispatcher;
pub mod hub;
pub mod protocol;
pub mod room;
pub mod session;
pub mod ws;

pub use hub::Hub;
pub use room::Room;
pub use session::ClientSession;
