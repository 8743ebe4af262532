// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The process-wide operation log.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::OperationRecord;

/// An append-only log of storage operations, shared across requests.
///
/// Appends from overlapping requests may interleave in any order; the log
/// only guarantees that every append is retained.
#[derive(Clone, Debug, Default)]
pub struct OperationLog(Arc<RwLock<Vec<OperationRecord>>>);

impl OperationLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the log.
    pub async fn append(&self, record: OperationRecord) {
        self.0.write().await.push(record);
    }

    /// Returns a snapshot of all records appended so far.
    pub async fn read_all(&self) -> Vec<OperationRecord> {
        self.0.read().await.clone()
    }
}
