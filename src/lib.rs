//! WebSocket-to-TCP gateway bridging browser clients to IoT-LAB node serial
//! links. The core is the connection multiplexer: `Gateway` shares one TCP
//! connection per node across admitted WebSocket `Session`s, each tracked
//! by `NodeTcp`. `Admission` gates entry with a remote `AuthApi`, optionally
//! backed in-process by `LocalApi`.

pub mod admission;
pub mod api;
pub mod app;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod node_tcp;
pub mod session;
pub mod ws_controller;
