//! Serves the calculator, greet, blog and address book services.
//!
//! Run with: cargo run --bin streamrpc-server
//!
//! `STREAMRPC_ADDR` and `STREAMRPC_ADDRESS_BOOK` override the listen address
//! and the address book file. HTTP/1.1 and HTTP/2 cleartext are both
//! accepted; bidirectional calls need HTTP/2 to stream in both directions
//! at once.

use streamrpc_examples::addressbook::AddressBook;
use streamrpc_examples::blog::MemoryBlogStore;
use streamrpc_examples::{AppState, Config};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,streamrpc=debug")),
        )
        .init();

    let config = Config::from_env()?;
    let address_book = AddressBook::new(&config.address_book);
    tracing::info!(path = %address_book.path().display(), "using address book");

    let state = AppState::new(MemoryBlogStore::new(), address_book);
    let registry = streamrpc_examples::registry(state)?;
    for (method, shape) in registry.methods() {
        tracing::info!(method, %shape, "serving");
    }

    let listener = TcpListener::bind(config.addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, registry.into_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
