//! chama-client: async client for the chama chat WebSocket.

pub mod client;

pub use client::ChatClient;
