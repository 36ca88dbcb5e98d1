//! Chat platform adapters behind the [`ChatPort`] capability trait.

pub mod discord;
pub mod traits;

pub use discord::{DiscordGateway, DiscordPort};
pub use traits::ChatPort;
