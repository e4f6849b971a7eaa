mod service;

pub use service::{ClickContext, Resolved, Resolver};
