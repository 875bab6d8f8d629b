#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod client;
mod endpoint;
mod error;
pub mod model;

pub use client::{WebClient, WebConfig};
pub use endpoint::WebEndpoint;
pub use error::{Error, Result};
pub use model::{IllustId, UserId};
pub use reqwest;
