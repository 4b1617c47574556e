//! # Switcher Server
//!
//! HTTP front end for the artifact switcher:
//!
//! - `GET <route>` delivers the route's environment in its configured mode
//! - `POST /api/set-new-version` rebinds an environment
//! - `GET /health` and `GET /metrics`
//! - Graceful shutdown on SIGINT/SIGTERM
//!
//! ## Example
//!
//! ```rust,ignore
//! use switcher_server::{App, Server, SwitcherConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SwitcherConfig::default().with_env_overrides();
//!     config.validate()?;
//!
//!     let server = Server::bind(App::from_config(&config)?, &config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/switcher-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod error;
pub mod health;
pub mod router;
pub mod server;
pub mod shutdown;

pub use app::App;
pub use config::{RouteConfig, SwitcherConfig};
pub use error::{ConfigError, ServerError, ServerResult};
pub use health::{HealthCheck, HealthStatus};
pub use router::{Route, Router};
pub use server::Server;
pub use shutdown::{ConnectionTracker, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
