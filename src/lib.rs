#![doc(html_root_url = "https://docs.rs/reflex-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Server-dispatched reflexes for DOM pages.
//!
//! A reflex is a named server-side action (`Handler#method`) triggered from an element in the page.
//! The [`client`] sends an [`Invocation`](`envelope::Invocation`) describing the element, the [`server`] runs the
//! handler and answers with a batch of patch [`Operation`](`protocol::Operation`)s tagged with the invocation's
//! [`CorrelationId`](`envelope::CorrelationId`), and the client applies them while walking the invocation through
//! its lifecycle.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod client;
pub mod config;
pub mod dom;
pub mod envelope;
pub mod error;
pub mod protocol;
pub mod resolver;
pub mod scanner;
pub mod selector;
#[cfg(not(target_arch = "wasm32"))]
pub mod server;
pub mod transport;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use protocol::PROTOCOL_VERSION;
