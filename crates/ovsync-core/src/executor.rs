// ── Transaction execution ──
//
// Submits one operation list as a single `transact` call and turns the
// server's per-operation replies into a `Result`. Never touches the caches:
// effects of a committed transaction arrive through the update stream.

use std::sync::Arc;

use tracing::{debug, warn};

use ovsync_api::{Operation, OperationResult, Ovsdb};

use crate::error::CoreError;

#[derive(Clone)]
pub struct TransactionExecutor {
    conn: Arc<dyn Ovsdb>,
    database: String,
}

impl TransactionExecutor {
    pub fn new(conn: Arc<dyn Ovsdb>, database: impl Into<String>) -> Self {
        Self {
            conn,
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Run `operations` as one transaction. `action` names the caller's
    /// intent in errors and logs. No retries.
    pub async fn execute(
        &self,
        operations: &[Operation],
        action: &str,
    ) -> Result<Vec<OperationResult>, CoreError> {
        debug!(action, operations = operations.len(), "submitting transaction");
        let replies = self.conn.transact(&self.database, operations).await?;

        match validate_replies(operations, &replies, action) {
            Ok(()) => {
                debug!(action, "transaction committed");
                Ok(replies)
            }
            Err(err) => {
                warn!(action, error = %err, "transaction rejected");
                Err(err)
            }
        }
    }
}

/// Check a transaction reply against the operations that produced it.
///
/// A reply shorter than the request fails the whole transaction. Otherwise
/// the first reply carrying an error decides the outcome: within the
/// submitted operations it names that operation's index, past them it is a
/// commit-level failure with no index.
pub fn validate_replies(
    operations: &[Operation],
    replies: &[OperationResult],
    action: &str,
) -> Result<(), CoreError> {
    if replies.len() < operations.len() {
        return Err(CoreError::Protocol {
            action: action.to_owned(),
            expected: operations.len(),
            received: replies.len(),
        });
    }

    let failed = replies
        .iter()
        .enumerate()
        .find_map(|(i, reply)| reply.error().map(|code| (i, code, reply)));

    match failed {
        Some((i, code, reply)) => Err(CoreError::Transaction {
            action: action.to_owned(),
            index: (i < operations.len()).then_some(i),
            code: code.to_owned(),
            details: reply.details.clone().filter(|d| !d.is_empty()),
        }),
        None => Ok(()),
    }
}
