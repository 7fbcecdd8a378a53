//! Textclass Client
//!
//! Async client for the textclass command protocol. One [`Client`] holds
//! one connection and performs one command round trip at a time.
//!
//! ```no_run
//! # async fn demo() -> textclass_core::Result<()> {
//! let mut client = textclass_client::Client::connect("127.0.0.1", 3333).await?;
//! let response = client.predict_stream(b"first line\nsecond line").await?;
//! println!("{}", response.result);
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{Client, DEFAULT_CHUNK_SIZE};
