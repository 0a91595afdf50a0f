use async_trait::async_trait;
use sea_orm::sea_query::SelectStatement;

use crate::{AttributedType, IdentityError, IdentityResult, Row, RowShape, Value};

/// Narrow relational contract the store runs against. Implementations own isolation and
/// atomicity; nothing here retries or buffers across calls.
#[async_trait]
pub trait RelationalSession: Send + Sync {
    async fn find(&self, shape: &RowShape, identifier: &Value) -> IdentityResult<Option<Row>>;
    async fn insert(&self, shape: &RowShape, row: &Row) -> IdentityResult<()>;
    async fn merge(&self, shape: &RowShape, row: &Row) -> IdentityResult<()>;
    async fn remove(&self, shape: &RowShape, row: &Row) -> IdentityResult<()>;
    /// Runs `select` and decodes every returned column that `shape` declares.
    async fn execute(&self, shape: &RowShape, select: &SelectStatement)
    -> IdentityResult<Vec<Row>>;
    async fn flush(&self) -> IdentityResult<()>;
}

/// Per-call invocation context.
#[derive(Clone, Default)]
pub struct IdentityContext<'a> {
    session: Option<&'a dyn RelationalSession>,
    partition: Option<AttributedType>,
}

impl<'a> IdentityContext<'a> {
    pub fn new(session: &'a dyn RelationalSession) -> Self {
        Self {
            session: Some(session),
            partition: None,
        }
    }

    pub fn with_partition(mut self, partition: AttributedType) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn session(&self) -> IdentityResult<&'a dyn RelationalSession> {
        self.session.ok_or_else(|| {
            IdentityError::missing_session("invocation context does not carry a relational session")
        })
    }

    pub fn partition(&self) -> Option<&AttributedType> {
        self.partition.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::IdentityContext;
    use crate::{AttributedType, IdentityError, REALM};

    #[test]
    fn empty_context_reports_missing_session() {
        let context = IdentityContext::default().with_partition(AttributedType::new(REALM));
        let err = context.session().err().expect("missing session");
        assert!(matches!(err, IdentityError::MissingSessionParameter { .. }));
        assert!(context.partition().is_some());
    }
}
