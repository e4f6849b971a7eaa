mod click;
mod link;

pub(crate) use click::ClickRow;
pub use click::{AnalyticsResponse, ClickEvent, ClickLog, NewClickEvent};
pub use link::{Link, LinkRow, ShortenRequest, ShortenResponse};
