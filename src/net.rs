//! Server payloads and the host transport/notification seams

use crate::error::GridError;
use futures::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Accepts `17` or `"17"` as a record id
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected id, got {}", other))),
    }
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn id_list(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GridError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Error for a non-2xx reply, preferring the server's `message`
    pub fn error(&self, fallback: &str) -> GridError {
        let message = self
            .json::<ErrorReply>()
            .ok()
            .and_then(|reply| reply.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        GridError::Http {
            status: self.status,
            message,
        }
    }
}

/// Asynchronous HTTP, supplied by the host. Requests carry the
/// `X-Requested-With: XMLHttpRequest` marker the server keys fragments on.
pub trait Transport {
    fn get(&self, url: &str) -> LocalBoxFuture<'static, Result<HttpResponse, GridError>>;
    fn delete(&self, url: &str) -> LocalBoxFuture<'static, Result<HttpResponse, GridError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: Option<String>,
}

impl Notice {
    pub fn success() -> Self {
        Self {
            kind: NoticeKind::Success,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: Some(message.into()),
        }
    }
}

pub trait Notifier {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorReply {
    #[serde(default)]
    message: Option<String>,
}

/// One server-rendered row for an upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub html: String,
}

/// Both sides of a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub outgoing_transaction: RowPayload,
    pub incoming_transaction: RowPayload,
}

/// Reply to a delete request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteReply {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub related_transaction_id: Option<String>,
}

/// Paging data returned with a table body
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageContext {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    /// Remaining keys, among them the `<entity>_ids` list
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PageContext {
    /// Record ids for the rows of this page, from the first key ending in `ids`
    pub fn row_ids(&self) -> Option<Vec<String>> {
        self.extra
            .iter()
            .find(|(key, value)| key.ends_with("ids") && value.is_array())
            .and_then(|(_, value)| value.as_array())
            .map(|values| id_list(values))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePage {
    pub html: String,
    pub context: PageContext,
}

/// Whole-table replacement with record ids aligned to its rows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableReplace {
    pub html: String,
    #[serde(default)]
    pub ids: Vec<Value>,
}

impl TableReplace {
    pub fn row_ids(&self) -> Vec<String> {
        id_list(&self.ids)
    }
}
