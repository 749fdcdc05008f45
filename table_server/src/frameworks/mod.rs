// Framework bootstrap: runtime setup, env config and the HTTP server.

pub mod config;
pub mod server;
