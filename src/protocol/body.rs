//! Request body collection

use std::error::Error as StdError;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;

use crate::error::{Result, TodoKvError};

/// Collect a request body of at most `max` bytes
///
/// A declared `Content-Length` over the limit is refused before anything
/// is read. Chunked bodies are cut off as soon as they pass it.
pub async fn read_body<B>(body: B, max: usize) -> Result<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    if body.size_hint().lower() > max as u64 {
        return Err(TodoKvError::BodyTooLarge { max });
    }

    match Limited::new(body, max).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(TodoKvError::BodyTooLarge { max })
        }
        Err(e) => Err(TodoKvError::Protocol(format!(
            "cannot read request body: {}",
            e
        ))),
    }
}
