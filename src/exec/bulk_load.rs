// src/exec/bulk_load.rs

use tracing::info;

use crate::exec::{ExecContext, ExecFuture, Executor, TaskOutput};
use crate::warehouse::{BulkLoadRequest, LoadMode, WarehouseClient};

/// Copy data from an external object location into a staging relation.
///
/// Success is all-or-nothing: an unreachable source or a rejected load is
/// surfaced as the warehouse error, never as a partial success. Replace mode
/// makes the load safe to repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLoad {
    pub request: BulkLoadRequest,
}

impl BulkLoad {
    pub fn new(source: impl Into<String>, target: impl Into<String>, mode: LoadMode) -> Self {
        Self {
            request: BulkLoadRequest {
                source: source.into(),
                target: target.into(),
                format: None,
                mode,
                iam_role: None,
            },
        }
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.request.format = Some(format.into());
        self
    }

    pub fn iam_role(mut self, role: impl Into<String>) -> Self {
        self.request.iam_role = Some(role.into());
        self
    }
}

impl Executor for BulkLoad {
    fn kind(&self) -> &'static str {
        "bulk_load"
    }

    fn validate(&self) -> Result<(), String> {
        if self.request.target.trim().is_empty() {
            return Err("bulk_load target must not be empty".to_string());
        }
        if !self.request.source.contains("://") {
            return Err(format!(
                "bulk_load source '{}' must be a URL (e.g. s3://bucket/prefix)",
                self.request.source
            ));
        }
        Ok(())
    }

    fn run<'a>(
        &'a self,
        warehouse: &'a dyn WarehouseClient,
        ctx: &'a ExecContext,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            info!(
                parent: &ctx.span,
                source = %self.request.source,
                target = %self.request.target,
                mode = ?self.request.mode,
                "bulk loading into staging relation"
            );
            warehouse.bulk_load(&self.request).await?;
            Ok(TaskOutput::Loaded {
                target: self.request.target.clone(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_must_be_a_location() {
        let load = BulkLoad::new("log-data", "staging_events", LoadMode::Replace);
        assert!(load.validate().is_err());

        let load = BulkLoad::new("s3://bucket/log-data", "staging_events", LoadMode::Replace);
        assert!(load.validate().is_ok());
    }
}
