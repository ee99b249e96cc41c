/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! A 1-bounded channel whose sender waits until the receiver asks for more
//!
//! Sending an item completes only once the receiver has taken it and then polled again for the
//! next one, so the producer can never run ahead of demand.

use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Semaphore;

pub(crate) fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    let semaphore = Arc::new(Semaphore::new(0));
    (
        Sender {
            semaphore: semaphore.clone(),
            chan: tx,
        },
        Receiver {
            semaphore,
            chan: rx,
            needs_permit: false,
        },
    )
}

/// The receiver went away
#[derive(Debug)]
pub(crate) struct Closed;

#[derive(Debug)]
pub(crate) struct Sender<T> {
    semaphore: Arc<Semaphore>,
    chan: tokio::sync::mpsc::Sender<T>,
}

impl<T> Sender<T> {
    pub(crate) async fn send(&self, item: T) -> Result<(), Closed> {
        self.chan.send(item).await.map_err(|_| Closed)?;
        // wait _after_ the send until more demand exists
        match self.semaphore.acquire().await {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            // closed when the receiver is dropped
            Err(_) => Err(Closed),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Receiver<T> {
    semaphore: Arc<Semaphore>,
    chan: tokio::sync::mpsc::Receiver<T>,
    needs_permit: bool,
}

impl<T> Receiver<T> {
    pub(crate) fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let resp = self.chan.poll_recv(cx);
        // no data on the channel while we are reading: give a permit so more can be loaded
        if self.needs_permit && resp.is_pending() {
            self.needs_permit = false;
            self.semaphore.add_permits(1);
        }
        if resp.is_ready() {
            self.needs_permit = true;
        }
        resp
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.semaphore.close();
    }
}
