//! Game API boundary: HTTP wrapper, headers and typed payloads.

pub mod client;
pub mod headers;
pub mod types;

pub use client::{GameClient, RawResponse, ResponseBody};
pub use types::{DecodeError, Mission, MissionStatus, UserProfile};
