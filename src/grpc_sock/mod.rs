//! A client/server implementation using UNIX sockets for gRPC, meant for use with tonic. Socket
//! support is not built in to tonic, so the listener and the connector live here.

pub mod client;
pub mod server;
