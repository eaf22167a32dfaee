//! Tap-Earn Client SDK.
//!
//! This crate provides a client library for the bot process and other services
//! that talk to the tap-earn ledger API.
//!
//! # Example
//!
//! ```no_run
//! use tap_earn_client::TapEarnClient;
//! use tap_earn_core::AccountId;
//!
//! # async fn example() -> Result<(), tap_earn_client::ClientError> {
//! let client = TapEarnClient::new("http://tap-earn:8080", "your-service-api-key")?;
//!
//! // Link a referral from a /start payload
//! let linked = client
//!     .link_referral(AccountId::new(6_733_587_823), AccountId::new(42))
//!     .await?;
//! println!("linked: {linked}");
//!
//! // Act on behalf of a Mini App user with their init data
//! let tap = client.tap("query_id=...&user=...&auth_date=...&hash=...").await?;
//! println!("New balance: {} points", tap.new_balance);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, TapEarnClient};
pub use error::ClientError;
pub use types::*;
