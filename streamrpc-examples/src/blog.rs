//! Blog service: CRUD over an injected [`BlogStore`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use streamrpc::prelude::*;
use tokio::sync::RwLock;

use crate::AppState;

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Blog {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub author_id: String,
    #[prost(string, tag = "3")]
    pub title: String,
    #[prost(string, tag = "4")]
    pub content: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateBlogRequest {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadBlogRequest {
    #[prost(string, tag = "1")]
    pub blog_id: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateBlogRequest {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteBlogRequest {
    #[prost(string, tag = "1")]
    pub blog_id: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteBlogResponse {
    #[prost(string, tag = "1")]
    pub blog_id: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct ListBlogRequest {}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ListBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

/// Blog identifier: 24 lowercase hex digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlogId(u128);

impl BlogId {
    const LEN: usize = 24;
}

impl FromStr for BlogId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidId(s.to_string()));
        }
        u128::from_str_radix(s, 16)
            .map(BlogId)
            .map_err(|_| StoreError::InvalidId(s.to_string()))
    }
}

impl fmt::Display for BlogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:024x}", self.0)
    }
}

/// Blog contents without an id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlogRecord {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl BlogRecord {
    fn into_blog(self, id: BlogId) -> Blog {
        Blog {
            id: id.to_string(),
            author_id: self.author_id,
            title: self.title,
            content: self.content,
        }
    }
}

impl From<Blog> for BlogRecord {
    fn from(blog: Blog) -> Self {
        Self {
            author_id: blog.author_id,
            title: blog.title,
            content: blog.content,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot parse blog id {0:?}")]
    InvalidId(String),

    #[error("cannot find blog with id {0}")]
    NotFound(BlogId),

    #[error("blog store failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(_) => RpcError::invalid_argument(err.to_string()),
            StoreError::NotFound(_) => RpcError::not_found(err.to_string()),
            StoreError::Backend(_) => RpcError::other(err),
        }
    }
}

/// Persistence for blog records.
pub trait BlogStore: Send + Sync + 'static {
    /// Store `record` under a fresh id.
    fn create(&self, record: BlogRecord) -> BoxFuture<'_, Result<BlogId, StoreError>>;

    fn read(&self, id: BlogId) -> BoxFuture<'_, Result<BlogRecord, StoreError>>;

    /// Replace the record stored under `id`.
    fn update(&self, id: BlogId, record: BlogRecord) -> BoxFuture<'_, Result<(), StoreError>>;

    fn delete(&self, id: BlogId) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Every record, ordered by id.
    fn list(&self) -> BoxFuture<'_, Result<Vec<(BlogId, BlogRecord)>, StoreError>>;
}

/// In-memory [`BlogStore`]. Ids are allocated sequentially.
#[derive(Debug, Default)]
pub struct MemoryBlogStore {
    next_id: AtomicU64,
    blogs: RwLock<BTreeMap<BlogId, BlogRecord>>,
}

impl MemoryBlogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlogStore for MemoryBlogStore {
    fn create(&self, record: BlogRecord) -> BoxFuture<'_, Result<BlogId, StoreError>> {
        async move {
            let id = BlogId(u128::from(self.next_id.fetch_add(1, Ordering::Relaxed) + 1));
            self.blogs.write().await.insert(id, record);
            Ok(id)
        }
        .boxed()
    }

    fn read(&self, id: BlogId) -> BoxFuture<'_, Result<BlogRecord, StoreError>> {
        async move {
            self.blogs
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound(id))
        }
        .boxed()
    }

    fn update(&self, id: BlogId, record: BlogRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            let mut blogs = self.blogs.write().await;
            let slot = blogs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            *slot = record;
            Ok(())
        }
        .boxed()
    }

    fn delete(&self, id: BlogId) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            self.blogs
                .write()
                .await
                .remove(&id)
                .map(|_| ())
                .ok_or(StoreError::NotFound(id))
        }
        .boxed()
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<(BlogId, BlogRecord)>, StoreError>> {
        async move {
            let blogs = self.blogs.read().await;
            Ok(blogs.iter().map(|(id, r)| (*id, r.clone())).collect())
        }
        .boxed()
    }
}

pub fn register(registry: &mut Registry<AppState>) -> Result<(), Status> {
    registry.register_unary("blog.BlogService/CreateBlog", create_blog)?;
    registry.register_unary("blog.BlogService/ReadBlog", read_blog)?;
    registry.register_unary("blog.BlogService/UpdateBlog", update_blog)?;
    registry.register_unary("blog.BlogService/DeleteBlog", delete_blog)?;
    registry.register_server_stream("blog.BlogService/ListBlog", list_blog)?;
    Ok(())
}

fn required(blog: Option<Blog>) -> Result<Blog, RpcError> {
    blog.ok_or_else(|| RpcError::invalid_argument("blog is required"))
}

async fn create_blog(
    state: AppState,
    req: CreateBlogRequest,
    _: CallContext,
) -> Result<CreateBlogResponse, RpcError> {
    let record = BlogRecord::from(required(req.blog)?);
    let id = state.blogs.create(record.clone()).await?;
    tracing::debug!(%id, "blog created");
    Ok(CreateBlogResponse {
        blog: Some(record.into_blog(id)),
    })
}

async fn read_blog(
    state: AppState,
    req: ReadBlogRequest,
    _: CallContext,
) -> Result<ReadBlogResponse, RpcError> {
    let id: BlogId = req.blog_id.parse()?;
    let record = state.blogs.read(id).await?;
    Ok(ReadBlogResponse {
        blog: Some(record.into_blog(id)),
    })
}

async fn update_blog(
    state: AppState,
    req: UpdateBlogRequest,
    _: CallContext,
) -> Result<UpdateBlogResponse, RpcError> {
    let blog = required(req.blog)?;
    let id: BlogId = blog.id.parse()?;
    let record = BlogRecord::from(blog);
    state.blogs.update(id, record.clone()).await?;
    Ok(UpdateBlogResponse {
        blog: Some(record.into_blog(id)),
    })
}

async fn delete_blog(
    state: AppState,
    req: DeleteBlogRequest,
    _: CallContext,
) -> Result<DeleteBlogResponse, RpcError> {
    let id: BlogId = req.blog_id.parse()?;
    state.blogs.delete(id).await?;
    tracing::debug!(%id, "blog deleted");
    Ok(DeleteBlogResponse {
        blog_id: id.to_string(),
    })
}

async fn list_blog(
    state: AppState,
    _: ListBlogRequest,
    _: CallContext,
    mut out: MessageSender<ListBlogResponse>,
) -> Result<(), RpcError> {
    for (id, record) in state.blogs.list().await? {
        out.push(ListBlogResponse {
            blog: Some(record.into_blog(id)),
        })?;
    }
    Ok(())
}
