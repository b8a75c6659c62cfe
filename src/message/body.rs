//! Decoded message bodies.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use serde_json::Value;

use crate::http::query::QueryMap;

/// Body of an inbound message after content-type dispatch.
#[derive(Debug)]
pub enum Body {
    /// Raw body read as a string (also the collapsed bare form token).
    Text(String),
    /// Decoded `application/json` body.
    Json(Value),
    /// Decoded `application/x-www-form-urlencoded` body.
    Form(QueryMap),
    /// Oversized body streamed to a temporary file.
    Spooled(SpooledBody),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Text(text) => text.is_empty(),
            Body::Json(value) => value.is_null(),
            Body::Form(map) => map.is_empty(),
            Body::Spooled(spooled) => spooled.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&QueryMap> {
        match self {
            Body::Form(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_spooled(&self) -> Option<&SpooledBody> {
        match self {
            Body::Spooled(spooled) => Some(spooled),
            _ => None,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Text(String::new())
    }
}

/// A request body held in an anonymous temporary file.
///
/// The file is unlinked on creation, so the storage is released as soon
/// as the last handle (this value and any readers) is dropped.
#[derive(Debug)]
pub struct SpooledBody {
    file: File,
    len: u64,
}

impl SpooledBody {
    pub(crate) fn new(file: File, len: u64) -> Self {
        Self { file, len }
    }

    /// Number of bytes written to the spool.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open a reader positioned at the start of the body.
    ///
    /// Readers share one file cursor; consume them one at a time.
    pub fn reader(&self) -> io::Result<File> {
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }

    /// Read the whole body into memory.
    pub fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len as usize);
        self.reader()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}
