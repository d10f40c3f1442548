#[macro_use]
extern crate diesel;

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod perms;
pub mod post;
pub mod query;
pub mod schema;
pub mod store;
pub mod tag;
pub mod util;

pub use config::Config;
pub use error::Error;
pub use perms::Actor;
