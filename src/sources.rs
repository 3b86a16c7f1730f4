//! Pluggable producers of raw update streams.
//!
//! [`UpdateSource`] is the seam between this crate and a platform client:
//! anything that can hand back a stream of [`Update`]s can feed the
//! pipeline. The long-polling HTTP client lives outside this crate;
//! [`StaticSource`] is the in-process implementation used by tests and
//! bootstrap code.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};

use crate::errors::SourceError;
use crate::events::Update;

/// A stream of raw updates borrowed from its source.
pub type UpdateStream<'a> = BoxStream<'a, Update>;

/// A producer of raw update streams.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Establish the update stream.
    async fn updates(&self) -> Result<UpdateStream<'_>, SourceError>;
}

/// Replays a fixed sequence of updates.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    updates: Vec<Update>,
}

impl StaticSource {
    /// Create a source replaying `updates` in order.
    #[must_use]
    pub fn new(updates: Vec<Update>) -> Self {
        Self { updates }
    }
}

#[async_trait]
impl UpdateSource for StaticSource {
    async fn updates(&self) -> Result<UpdateStream<'_>, SourceError> {
        Ok(Box::pin(stream::iter(self.updates.clone())))
    }
}
