//! Pipeline stages.
//!
//! | Stage | Role |
//! |-------|------|
//! | [`request_id`] | Adopt or keep the request ID |
//! | [`env_target`] | Choose the environment to serve |
//! | [`delivery`] | Resolve and deliver in a fixed mode |
//! | [`redirect`] | Redirect to a URL attached by DEFER |
//! | [`update`] | Validate and write a new binding |

pub mod delivery;
pub mod env_target;
pub mod redirect;
pub mod request_id;
pub mod update;

pub use delivery::DeliveryMiddleware;
pub use env_target::{EnvSource, EnvTargetMiddleware};
pub use redirect::RedirectMiddleware;
pub use request_id::RequestIdMiddleware;
pub use update::{parse_update, UpdateMiddleware};
