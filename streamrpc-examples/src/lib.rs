//! Demo services hosted on the streamrpc runtime.
//!
//! - [`calculator`]: one method per call shape.
//! - [`greet`]: the same shapes plus a deadline-aware unary call.
//! - [`blog`]: CRUD over an injected [`BlogStore`](blog::BlogStore).
//! - [`addressbook`]: people stored in a flat protobuf file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use streamrpc::{Registry, Status};

pub mod addressbook;
pub mod blog;
pub mod calculator;
pub mod greet;

use addressbook::AddressBook;
use blog::BlogStore;

/// Collaborators injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub blogs: Arc<dyn BlogStore>,
    pub address_book: Arc<AddressBook>,
}

impl AppState {
    pub fn new<B: BlogStore>(blogs: B, address_book: AddressBook) -> Self {
        Self {
            blogs: Arc::new(blogs),
            address_book: Arc::new(address_book),
        }
    }
}

/// Register every demo service.
pub fn registry(state: AppState) -> Result<Registry<AppState>, Status> {
    let mut registry = Registry::with_state(state);
    calculator::register(&mut registry)?;
    greet::register(&mut registry)?;
    blog::register(&mut registry)?;
    addressbook::register(&mut registry)?;
    Ok(registry)
}

/// Server settings read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// `STREAMRPC_ADDR`, default `0.0.0.0:3000`.
    pub addr: SocketAddr,
    /// `STREAMRPC_ADDRESS_BOOK`, default `addressbook.bin`.
    pub address_book: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid STREAMRPC_ADDR {value:?}: {source}")]
    InvalidAddr {
        value: String,
        source: std::net::AddrParseError,
    },
}

impl Config {
    pub const DEFAULT_ADDR: &'static str = "0.0.0.0:3000";
    pub const DEFAULT_ADDRESS_BOOK: &'static str = "addressbook.bin";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            std::env::var("STREAMRPC_ADDR").ok(),
            std::env::var("STREAMRPC_ADDRESS_BOOK").ok(),
        )
    }

    fn from_vars(addr: Option<String>, address_book: Option<String>) -> Result<Self, ConfigError> {
        let addr = addr.unwrap_or_else(|| Self::DEFAULT_ADDR.into());
        let addr = addr
            .parse()
            .map_err(|source| ConfigError::InvalidAddr {
                value: addr.clone(),
                source,
            })?;
        let address_book = address_book
            .unwrap_or_else(|| Self::DEFAULT_ADDRESS_BOOK.into())
            .into();
        Ok(Self { addr, address_book })
    }
}
