pub mod client;

pub use client::NatsBridge;
