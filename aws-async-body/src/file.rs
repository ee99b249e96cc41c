/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Bodies that read from a file

use crate::body::{AsyncBody, BodyStream};
use crate::error::BodyError;
use bytes::Bytes;
use futures_core::Stream;
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::fs::File;
use tokio::io::{self, AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

// 4KB corresponds to the default buffer size used by Tokio's ReaderStream
const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Builder for file bodies, returned by [`AsyncBody::read_from`]
///
/// ```no_run
/// # async fn docs() -> Result<(), aws_async_body::BodyError> {
/// use aws_async_body::AsyncBody;
///
/// let body = AsyncBody::read_from()
///     .path("docs/some-large-file.csv")
///     // read the second mebibyte only
///     .offset(1024 * 1024)
///     .length(1024 * 1024)
///     .buffer_size(32_768)
///     .build()
///     .await?;
/// assert!(body.is_replayable());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileBodyBuilder {
    path: Option<PathBuf>,
    offset: u64,
    length: Option<u64>,
    buffer_size: usize,
}

impl Default for FileBodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FileBodyBuilder {
    /// A builder reading the whole file with a 4096 byte buffer
    pub fn new() -> Self {
        Self {
            path: None,
            offset: 0,
            length: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Path of the file to read. Required.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Byte offset to start reading from
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Maximum number of bytes to read
    ///
    /// Defaults to the rest of the file after `offset`. A length that runs past the end of the
    /// file is shortened to fit.
    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Size of each read from the file, which is also the largest chunk the body produces
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Check the file and create the body
    ///
    /// The file is not held open: each subscription opens it again, and dropping the subscription
    /// closes it.
    pub async fn build(self) -> Result<AsyncBody, BodyError> {
        let path = self.path.ok_or(BodyError::MissingPath)?;
        let file_size = tokio::fs::metadata(&path).await?.len();
        if self.offset > file_size {
            return Err(BodyError::OffsetGreaterThanFileSize {
                offset: self.offset,
                file_size,
            });
        }
        let available = file_size - self.offset;
        let length = self.length.map_or(available, |len| len.min(available));
        tracing::trace!(path = %path.display(), offset = self.offset, length, "created file body");
        Ok(AsyncBody::from_file(FileSource {
            path,
            offset: self.offset,
            length,
            buffer_size: self.buffer_size.max(1),
        }))
    }
}

#[derive(Debug)]
pub(crate) struct FileSource {
    path: PathBuf,
    offset: u64,
    length: u64,
    buffer_size: usize,
}

impl FileSource {
    pub(crate) fn length(&self) -> u64 {
        self.length
    }

    pub(crate) fn open(&self) -> BodyStream {
        BodyStream::new(FileStream {
            state: State::Unloaded(self.path.clone()),
            offset: self.offset,
            length: self.length,
            remaining: self.length,
            buffer_size: self.buffer_size,
        })
    }
}

type OpenFuture = Pin<Box<dyn Future<Output = io::Result<File>> + Send>>;

enum State {
    Unloaded(PathBuf),
    Loading(OpenFuture),
    Loaded(ReaderStream<Take<File>>),
    Done,
}

struct FileStream {
    state: State,
    offset: u64,
    length: u64,
    /// Bytes still owed to the consumer
    remaining: u64,
    buffer_size: usize,
}

impl Stream for FileStream {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let offset = self.offset;
        loop {
            match &mut self.state {
                State::Unloaded(path) => {
                    let path = path.clone();
                    self.state = State::Loading(Box::pin(async move {
                        let mut file = File::open(&path).await?;
                        if offset != 0 {
                            file.seek(SeekFrom::Start(offset)).await?;
                        }
                        Ok(file)
                    }));
                }
                State::Loading(future) => match ready!(future.as_mut().poll(cx)) {
                    Ok(file) => {
                        let (length, buffer_size) = (self.length, self.buffer_size);
                        self.state = State::Loaded(ReaderStream::with_capacity(
                            file.take(length),
                            buffer_size,
                        ));
                    }
                    Err(err) => {
                        self.state = State::Done;
                        return Poll::Ready(Some(Err(err.into())));
                    }
                },
                State::Loaded(stream) => {
                    let item = ready!(Pin::new(stream).poll_next(cx));
                    return match item {
                        Some(Ok(data)) => {
                            self.remaining = self.remaining.saturating_sub(data.len() as u64);
                            Poll::Ready(Some(Ok(data)))
                        }
                        Some(Err(err)) => {
                            self.state = State::Done;
                            Poll::Ready(Some(Err(err.into())))
                        }
                        None => {
                            // release the handle as soon as the read is complete
                            self.state = State::Done;
                            if self.remaining > 0 {
                                let missing = self.remaining;
                                return Poll::Ready(Some(Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    format!("file ended {} bytes before the expected length", missing),
                                )
                                .into())));
                            }
                            Poll::Ready(None)
                        }
                    };
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn reads_the_whole_file() {
        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let file = temp_file(&data);
        let body = AsyncBody::read_from()
            .path(file.path())
            .buffer_size(1000)
            .build()
            .await
            .unwrap();
        assert_eq!(Some(10_000), body.size_hint().exact_len());

        let mut stream = body.subscribe();
        let mut read = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= 1000);
            read.extend_from_slice(&chunk);
        }
        assert_eq!(data, read);
    }

    #[tokio::test]
    async fn offset_and_length() {
        let file = temp_file(b"0123456789");
        let body = AsyncBody::read_from()
            .path(file.path())
            .offset(3)
            .length(4)
            .build()
            .await
            .unwrap();
        assert_eq!(Some(4), body.size_hint().exact_len());
        assert_eq!("3456", body.collect().await.unwrap());

        let clamped = AsyncBody::read_from()
            .path(file.path())
            .offset(8)
            .length(100)
            .build()
            .await
            .unwrap();
        assert_eq!(Some(2), clamped.size_hint().exact_len());
        assert_eq!("89", clamped.collect().await.unwrap());
    }

    #[tokio::test]
    async fn offset_past_the_end() {
        let file = temp_file(b"0123456789");
        let err = AsyncBody::read_from()
            .path(file.path())
            .offset(11)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BodyError::OffsetGreaterThanFileSize {
                offset: 11,
                file_size: 10
            }
        ));

        let at_end = AsyncBody::read_from()
            .path(file.path())
            .offset(10)
            .build()
            .await
            .unwrap();
        assert_eq!("", at_end.collect().await.unwrap());
    }

    #[tokio::test]
    async fn missing_path_and_missing_file() {
        assert!(matches!(
            AsyncBody::read_from().build().await,
            Err(BodyError::MissingPath)
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AsyncBody::read_from()
                .path(dir.path().join("absent"))
                .build()
                .await,
            Err(BodyError::Io(_))
        ));
    }

    #[tokio::test]
    async fn every_subscription_rereads_the_file() {
        let file = temp_file(b"replay me");
        let body = AsyncBody::read_from()
            .path(file.path())
            .build()
            .await
            .unwrap();
        assert!(body.is_replayable());
        assert_eq!("replay me", body.collect().await.unwrap());
        assert_eq!("replay me", body.collect().await.unwrap());
    }

    #[tokio::test]
    async fn file_removed_after_subscribing_fails_the_read() {
        let file = temp_file(b"short-lived");
        let body = AsyncBody::read_from()
            .path(file.path())
            .build()
            .await
            .unwrap();
        let stream = body.subscribe();
        file.close().unwrap();
        assert!(matches!(stream.collect().await, Err(BodyError::Io(_))));
    }

    #[tokio::test]
    async fn file_truncated_after_build_fails_the_read() {
        let file = temp_file(b"0123456789");
        let body = AsyncBody::read_from()
            .path(file.path())
            .build()
            .await
            .unwrap();
        assert_eq!(Some(10), body.size_hint().exact_len());
        file.as_file().set_len(4).unwrap();

        let mut stream = body.subscribe();
        assert_eq!(b"0123"[..], stream.next().await.unwrap().unwrap()[..]);
        match stream.next().await {
            Some(Err(BodyError::Io(err))) => {
                assert_eq!(io::ErrorKind::UnexpectedEof, err.kind())
            }
            other => panic!("expected an early end of file, got {:?}", other),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_file() {
        let data = vec![b'z'; 64 * 1024];
        let file = temp_file(&data);
        let path = file.into_temp_path();
        let body = AsyncBody::read_from()
            .path(&path)
            .buffer_size(1024)
            .build()
            .await
            .unwrap();

        let mut stream = body.subscribe();
        assert_eq!(1024, stream.next().await.unwrap().unwrap().len());
        drop(stream);

        path.close().unwrap();
        assert!(matches!(body.collect().await, Err(BodyError::Io(_))));
    }
}
