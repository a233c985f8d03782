//! MCP (Model Context Protocol) server for Hark.
//!
//! Exposes transcript lookup, feed discovery, the cache and batch jobs as
//! tools for AI assistants. Implements JSON-RPC 2.0 over stdio.

mod protocol;
mod server;
mod tools;

pub use server::McpServer;
