//! Text form of persisted values.
//!
//! Values are stored as JSON, so anything made of objects, arrays,
//! strings, numbers, booleans and null round-trips.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value for the store.
pub fn to_text<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string(value)
}

/// Decode a value read from the store.
pub fn from_text<T>(text: &str) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned,
{
    serde_json::from_str(text)
}
