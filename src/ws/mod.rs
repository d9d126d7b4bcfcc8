pub mod broadcast;
pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod heartbeat;
pub mod msg_relay_handler;
pub mod msg_update_handler;
pub mod registry;
