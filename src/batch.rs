//! Parallel batch gather: submit N requests, await them all, return results
//! in submission order.
//!
//! Each outcome is recorded at its submission index; `async fn` already
//! suspends at every `.await`, so gathering a `Vec` of futures with
//! `join_all` gives ordering without a separate suspension primitive.

use crate::client::{Client, RequestOptions};
use crate::error::{ClientError, Result};
use crate::protocol::Response;
use futures::future::join_all;

/// One outcome from [`Batch::await_all`]: whether the request succeeded,
/// and its response or error.
pub type BatchOutcome = (bool, Result<Response>);

/// Accumulates requests to issue concurrently against one [`Client`].
pub struct Batch<'a> {
    client: &'a Client,
    pending: Vec<(String, RequestOptions)>,
}

impl<'a> Batch<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self {
            client,
            pending: Vec::new(),
        }
    }

    /// Append one request to the pending list.
    pub fn push(&mut self, url: impl Into<String>, options: RequestOptions) {
        self.pending.push((url.into(), options));
    }

    /// Append many requests to the pending list.
    pub fn batch(&mut self, requests: impl IntoIterator<Item = (String, RequestOptions)>) {
        self.pending.extend(requests);
    }

    /// Issue every pending request concurrently and wait for all of them.
    /// `output[i]` corresponds to the i-th call to `push`/`batch`,
    /// regardless of completion order.
    ///
    /// If `throw_on_error`, the first failure (in submission order) is
    /// returned as `Err` instead of being folded into the output vector.
    pub async fn await_all(self, throw_on_error: bool) -> Result<Vec<BatchOutcome>> {
        let client = self.client;
        let futures = self.pending.into_iter().map(|(url, options)| async move {
            let result = client.request(&url, options).await;
            (result.is_ok(), result)
        });

        let mut results = join_all(futures).await;

        if throw_on_error {
            if let Some(pos) = results.iter().position(|(ok, _)| !ok) {
                let (_, err) = results.remove(pos);
                return Err(err.unwrap_err());
            }
        }

        Ok(results)
    }
}
