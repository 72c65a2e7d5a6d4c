//! Address book service backed by a flat protobuf file.
//!
//! The file holds a single encoded [`People`] message. A missing file reads
//! as an empty book; every addition rewrites the whole file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use prost::Message;
use serde::{Deserialize, Serialize};
use streamrpc::prelude::*;
use tokio::sync::Mutex;

use crate::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PhoneType {
    Mobile = 0,
    Home = 1,
    Work = 2,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneNumber {
    #[prost(string, tag = "1")]
    pub number: String,
    #[prost(enumeration = "PhoneType", tag = "2")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    #[prost(int32, tag = "1")]
    pub id: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub email: String,
    #[prost(message, repeated, tag = "4")]
    pub phones: Vec<PhoneNumber>,
}

/// On-disk representation of the book.
#[derive(Clone, PartialEq, prost::Message)]
pub struct People {
    #[prost(message, repeated, tag = "1")]
    pub people: Vec<Person>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct AddPersonRequest {
    #[prost(message, optional, tag = "1")]
    pub person: Option<Person>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddPersonResponse {
    #[prost(uint32, tag = "1")]
    pub people_count: u32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct ListPeopleRequest {}

#[derive(Debug, thiserror::Error)]
pub enum AddressBookError {
    #[error("address book I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("address book is corrupt: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl From<AddressBookError> for RpcError {
    fn from(err: AddressBookError) -> Self {
        RpcError::other(err)
    }
}

/// File-backed list of people.
///
/// Writers are serialized and replace the file with a rename, so readers
/// always see a complete book.
#[derive(Debug)]
pub struct AddressBook {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl AddressBook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every person in the book, in insertion order.
    pub async fn people(&self) -> Result<Vec<Person>, AddressBookError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(People::decode(bytes.as_slice())?.people)
    }

    /// Append `person` and return the new size of the book.
    ///
    /// The write runs on its own task holding the lock, so a cancelled
    /// caller never leaves a second writer racing a half-finished one.
    pub async fn add(&self, person: Person) -> Result<usize, AddressBookError> {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let mut people = self.people().await?;
        people.push(person);
        let count = people.len();
        let bytes = People { people }.encode_to_vec();

        let path = self.path.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let temp_path = path.with_extension("tmp");
            tokio::fs::write(&temp_path, &bytes).await?;
            tokio::fs::rename(&temp_path, &path).await?;
            tracing::debug!(path = %path.display(), count, "address book written");
            Ok::<_, std::io::Error>(())
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(count)
    }
}

pub fn register(registry: &mut Registry<AppState>) -> Result<(), Status> {
    registry.register_unary("addressbook.AddressBookService/AddPerson", add_person)?;
    registry.register_server_stream("addressbook.AddressBookService/ListPeople", list_people)?;
    Ok(())
}

async fn add_person(
    state: AppState,
    req: AddPersonRequest,
    _: CallContext,
) -> Result<AddPersonResponse, RpcError> {
    let mut person = req
        .person
        .ok_or_else(|| RpcError::invalid_argument("person is required"))?;
    person.name = person.name.trim().to_string();
    if person.name.is_empty() {
        return Err(RpcError::invalid_argument("person name must not be empty"));
    }
    person.email = person.email.trim().to_string();

    let count = state.address_book.add(person).await?;
    Ok(AddPersonResponse {
        people_count: u32::try_from(count).unwrap_or(u32::MAX),
    })
}

async fn list_people(
    state: AppState,
    _: ListPeopleRequest,
    _: CallContext,
    mut out: MessageSender<Person>,
) -> Result<(), RpcError> {
    for person in state.address_book.people().await? {
        out.push(person)?;
    }
    Ok(())
}
