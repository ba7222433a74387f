//! Handing a converted PDF to the transport.
//!
//! A [`ConvertedDocument`] keeps its request alive: the output file exists
//! until the document is consumed or dropped. The three ways to consume it
//! all end the request the same way:
//!
//! * [`ConvertedDocument::into_stream`] — chunked body for HTTP. The request
//!   is `Delivered` when the last chunk has been read; if the transport drops
//!   the stream first (client disconnect), it is `Failed(DeliveryError)`.
//!   Either way cleanup runs when the stream is dropped.
//! * [`ConvertedDocument::into_bytes`] — read into memory.
//! * [`ConvertedDocument::save_to`] — atomic copy to a destination path.

use crate::error::ConvertError;
use crate::orchestrator::RequestGuard;
use crate::request::{RequestId, Stage};
use crate::validate::download_name;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncReadExt;
use tracing::info;

/// Bytes read from the output file per body chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunked PDF body. Dropping it ends the request.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, std::io::Error>> + Send>>;

/// A successfully converted PDF awaiting delivery.
pub struct ConvertedDocument {
    guard: RequestGuard,
    path: PathBuf,
    download_name: String,
    len: u64,
}

impl std::fmt::Debug for ConvertedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertedDocument")
            .field("request_id", self.guard.id())
            .field("download_name", &self.download_name)
            .field("len", &self.len)
            .finish()
    }
}

impl ConvertedDocument {
    pub(crate) fn new(guard: RequestGuard, path: PathBuf, len: u64) -> Self {
        let download_name = download_name(&guard.request.filename);
        Self {
            guard,
            path,
            download_name,
            len,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        self.guard.id()
    }

    /// `<input stem>.pdf`, for `Content-Disposition`.
    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    /// Size of the PDF in bytes. Always > 0.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Location of the PDF in the working directory. Valid until consumed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Turn the document into a chunked byte stream.
    pub async fn into_stream(self) -> Result<DeliveryStream, ConvertError> {
        let Self {
            mut guard,
            path,
            len,
            ..
        } = self;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) => return Err(delivery_failed(&mut guard, format!("open output: {e}"))),
        };

        let stream = futures::stream::try_unfold(
            (file, guard, 0u64),
            move |(mut file, mut guard, sent)| async move {
                let mut buf = vec![0u8; CHUNK_SIZE];
                match file.read(&mut buf).await {
                    Ok(0) => {
                        // Close the file before the guard deletes it.
                        drop(file);
                        finish(&mut guard, sent, len);
                        Ok(None)
                    }
                    Ok(n) => {
                        buf.truncate(n);
                        Ok(Some((buf, (file, guard, sent + n as u64))))
                    }
                    Err(e) => {
                        delivery_failed(&mut guard, format!("read output: {e}"));
                        Err(e)
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }

    /// Read the whole PDF and finish the request.
    pub async fn into_bytes(self) -> Result<Vec<u8>, ConvertError> {
        let Self {
            mut guard,
            path,
            len,
            ..
        } = self;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                finish(&mut guard, bytes.len() as u64, len);
                Ok(bytes)
            }
            Err(e) => Err(delivery_failed(&mut guard, format!("read output: {e}"))),
        }
    }

    /// Copy the PDF to `dest` atomically (temp file + rename) and finish.
    pub async fn save_to(self, dest: &Path) -> Result<u64, ConvertError> {
        let Self {
            mut guard,
            path,
            len,
            ..
        } = self;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Err(delivery_failed(
                    &mut guard,
                    format!("create {}: {e}", parent.display()),
                ));
            }
        }

        let tmp = dest.with_extension("pdf.tmp");
        if let Err(e) = tokio::fs::copy(&path, &tmp).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(delivery_failed(
                &mut guard,
                format!("write {}: {e}", tmp.display()),
            ));
        }
        if let Err(e) = tokio::fs::rename(&tmp, dest).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(delivery_failed(
                &mut guard,
                format!("rename to {}: {e}", dest.display()),
            ));
        }

        finish(&mut guard, len, len);
        Ok(len)
    }
}

fn finish(guard: &mut RequestGuard, sent: u64, len: u64) {
    info!(request_id = %guard.id(), bytes = sent, expected = len, "delivered");
    guard.advance(Stage::Delivered);
}

fn delivery_failed(guard: &mut RequestGuard, detail: String) -> ConvertError {
    let err = ConvertError::Delivery { detail };
    guard.fail(&err);
    err
}
