use core::fmt;

use crate::RecordKey;

/// An item fetched from the paginated backend.
///
/// `index` is the backend's opaque ordering key; it is what gets passed back as the anchor of
/// subsequent fetches. `id` is a stable identity used to drop records that arrive twice (for
/// example when an anchor shifts by one between two calls). For most backends both are the
/// same value.
pub trait Record: Clone + Send + Sync + 'static {
    type Index: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    type Id: RecordKey + fmt::Debug;

    fn index(&self) -> Self::Index;
    fn id(&self) -> Self::Id;
}

/// A backing buffer entry: either a fetched record or a reserved, not yet fetched position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot<T> {
    Empty,
    Filled(T),
}

impl<T> Slot<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_item(&self) -> Option<&T> {
        match self {
            Self::Empty => None,
            Self::Filled(item) => Some(item),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Towards the head of the collection (`FetchPrev`).
    Backward,
    /// Towards the tail of the collection (`FetchNext`).
    Forward,
}

/// A single call to the backend: "give me `size` items starting `offset` items after `anchor`".
///
/// A `None` anchor means the very beginning of the collection. A negative offset asks for items
/// preceding the anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest<I> {
    pub anchor: Option<I>,
    pub size: usize,
    pub offset: i64,
}

/// A structured page reply.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Page<T> {
    pub items: Vec<T>,
    #[cfg_attr(feature = "serde", serde(rename = "isLast", alias = "is_last"))]
    pub is_last: bool,
}

/// What a [`crate::ChunkSource`] may answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchReply<T> {
    /// A bare list. End of data is inferred when fewer items than requested come back.
    Items(Vec<T>),
    /// A page that declares end of data explicitly.
    Page(Page<T>),
    /// Anything else. Treated as an empty, terminal reply and logged; never an error.
    Unrecognized(String),
}

impl<T> From<Vec<T>> for FetchReply<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Items(items)
    }
}

impl<T> From<Page<T>> for FetchReply<T> {
    fn from(page: Page<T>) -> Self {
        Self::Page(page)
    }
}

/// A reply normalized against the size it was requested with.
#[derive(Debug)]
pub(crate) struct Batch<T> {
    pub(crate) items: Vec<T>,
    pub(crate) end_reached: bool,
}

impl<T> FetchReply<T> {
    pub(crate) fn into_batch(self, requested: usize) -> Batch<T> {
        match self {
            Self::Items(items) => {
                let end_reached = items.len() < requested;
                Batch { items, end_reached }
            }
            Self::Page(page) => Batch {
                items: page.items,
                end_reached: page.is_last,
            },
            Self::Unrecognized(shape) => {
                rwarn!(
                    shape = shape.as_str(),
                    "protocol violation: unrecognized fetch reply"
                );
                let _ = shape;
                Batch {
                    items: Vec::new(),
                    end_reached: true,
                }
            }
        }
    }
}

#[cfg(feature = "serde")]
impl<T: serde::de::DeserializeOwned> FetchReply<T> {
    /// Decodes a JSON reply: an array is a bare list, an object with `items` and `isLast` is a
    /// page, anything else is [`FetchReply::Unrecognized`].
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        let is_page = matches!(
            &value,
            Value::Object(map)
                if map.contains_key("items")
                    && (map.contains_key("isLast") || map.contains_key("is_last"))
        );
        if is_page {
            return match serde_json::from_value::<Page<T>>(value) {
                Ok(page) => Self::Page(page),
                Err(err) => Self::Unrecognized(format!("malformed page: {err}")),
            };
        }

        match value {
            Value::Array(_) => match serde_json::from_value::<Vec<T>>(value) {
                Ok(items) => Self::Items(items),
                Err(err) => Self::Unrecognized(format!("array with undecodable items: {err}")),
            },
            Value::Object(_) => Self::Unrecognized("object without items/isLast".into()),
            Value::Null => Self::Unrecognized("null".into()),
            Value::Bool(_) => Self::Unrecognized("bool".into()),
            Value::Number(_) => Self::Unrecognized("number".into()),
            Value::String(_) => Self::Unrecognized("string".into()),
        }
    }
}
