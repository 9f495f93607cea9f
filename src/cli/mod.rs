//! # CLI Module
//!
//! Command-line interface for the `brrtserve` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Run the HTTP server with the guestbook application:
//!
//! ```bash
//! brrtserve serve --config brrtserve.yaml --addr 0.0.0.0:8080
//! ```
//!
//! Options:
//! - `--config <FILE>` - YAML [`ServerConfig`](crate::config::ServerConfig); defaults apply when omitted
//! - `--addr <ADDR>` - Listen address, overriding both the file and `BRRTS_ADDR`
//!
//! ### `routes`
//!
//! Print the route table in registration order, which is also match order:
//!
//! ```bash
//! brrtserve routes
//! ```

mod commands;


pub use commands::{build_dispatcher, load_config, run_cli, Cli, Commands};
