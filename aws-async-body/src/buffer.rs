/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! A bounded store of bytes read ahead from a body

use crate::body::{AsyncBody, BodyStream};
use crate::error::BodyError;
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

/// Outcome of [`ByteBufferStore::transfer_to`]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransferResult {
    /// The output was filled to the requested length
    SuccessfulTransfer,
    /// The body ended; the output holds whatever was left
    EndOfStream,
}

/// Reads a body ahead of its consumer, holding at most a fixed number of bytes
///
/// More data is only requested from the body while fewer than `max_bytes` are stored, so the
/// producer is held back until the consumer catches up. A single upstream chunk may take the
/// store past the bound; no further chunk is requested until it drops below again.
#[derive(Debug)]
pub struct ByteBufferStore {
    upstream: BodyStream,
    stored: VecDeque<Bytes>,
    stored_bytes: usize,
    max_bytes: usize,
    upstream_done: bool,
}

impl ByteBufferStore {
    /// Subscribe to `body`, storing up to `max_bytes` ahead of the consumer
    pub fn new(body: &AsyncBody, max_bytes: usize) -> Self {
        Self {
            upstream: body.subscribe(),
            stored: VecDeque::new(),
            stored_bytes: 0,
            max_bytes: max_bytes.max(1),
            upstream_done: false,
        }
    }

    /// Number of bytes read from the body but not yet transferred
    pub fn stored_bytes(&self) -> usize {
        self.stored_bytes
    }

    /// True once the body has ended and every stored byte has been transferred
    pub fn is_finished(&self) -> bool {
        self.upstream_done && self.stored.is_empty()
    }

    /// Read from the body until the store is full or the body ends
    pub async fn fill(&mut self) -> Result<(), BodyError> {
        while self.stored_bytes < self.max_bytes && !self.upstream_done {
            self.request_one().await?;
        }
        Ok(())
    }

    async fn request_one(&mut self) -> Result<(), BodyError> {
        match self.upstream.next().await {
            Some(data) => {
                let data = data?;
                tracing::trace!(len = data.len(), stored = self.stored_bytes, "stored chunk");
                if !data.is_empty() {
                    self.stored_bytes += data.len();
                    self.stored.push_back(data);
                }
            }
            None => self.upstream_done = true,
        }
        Ok(())
    }

    /// Move up to `len` bytes into `out`
    ///
    /// Waits for the body when the store runs dry. Returns
    /// [`TransferResult::SuccessfulTransfer`] once `out` has received `len` bytes, or
    /// [`TransferResult::EndOfStream`] if the body ended first.
    pub async fn transfer_to(
        &mut self,
        out: &mut BytesMut,
        len: usize,
    ) -> Result<TransferResult, BodyError> {
        let mut remaining = len;
        loop {
            while remaining > 0 {
                let Some(front) = self.stored.front_mut() else {
                    break;
                };
                let n = remaining.min(front.len());
                out.extend_from_slice(&front[..n]);
                front.advance(n);
                if front.is_empty() {
                    self.stored.pop_front();
                }
                self.stored_bytes -= n;
                remaining -= n;
            }
            if remaining == 0 {
                return Ok(TransferResult::SuccessfulTransfer);
            }
            if self.upstream_done {
                return Ok(TransferResult::EndOfStream);
            }
            self.request_one().await?;
        }
    }
}
