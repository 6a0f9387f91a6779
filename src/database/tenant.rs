use async_trait::async_trait;
use sqlx::PgPool;
use std::future::Future;
use uuid::Uuid;

use crate::errors::{DbError, DomainResult};

/// Identifies the organization (and the acting system user) an extraction
/// runs as. Every query issued while this context is active is scoped to the
/// organization by row-level security.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub org_id: Uuid,
    pub actor_id: Uuid,
}

impl TenantContext {
    pub fn new(org_id: Uuid, actor_id: Uuid) -> Self {
        Self { org_id, actor_id }
    }
}

/// Establishes and clears the row-level-security session context.
///
/// The database session carries the active org between calls, so a context
/// must never outlive the extraction it was set for — use
/// [`with_tenant_context`] rather than calling `begin`/`reset` directly.
#[async_trait]
pub trait TenantContextInitializer: Send + Sync {
    async fn begin(&self, ctx: &TenantContext) -> DomainResult<()>;
    async fn reset(&self) -> DomainResult<()>;
}

/// Postgres implementation backed by the platform's
/// `cmis.init_transaction_context(user_id, org_id)` function.
pub struct PgTenantContextInitializer {
    pool: PgPool,
}

impl PgTenantContextInitializer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantContextInitializer for PgTenantContextInitializer {
    async fn begin(&self, ctx: &TenantContext) -> DomainResult<()> {
        sqlx::query("SELECT cmis.init_transaction_context($1, $2)")
            .bind(ctx.actor_id)
            .bind(ctx.org_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::TenantContext(e.to_string()))?;
        Ok(())
    }

    async fn reset(&self) -> DomainResult<()> {
        sqlx::query("RESET cmis.current_org_id")
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::TenantContext(e.to_string()))?;
        sqlx::query("RESET cmis.current_user_id")
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::TenantContext(e.to_string()))?;
        Ok(())
    }
}

/// Run `f` with the tenant context set, resetting it on every exit path.
///
/// The reset happens whether `f` succeeds or fails, so an aborted extraction
/// can never leak its org scope into the next session user.
pub async fn with_tenant_context<F, Fut, T>(
    initializer: &dyn TenantContextInitializer,
    ctx: &TenantContext,
    f: F,
) -> DomainResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    initializer.begin(ctx).await?;
    let result = f().await;
    let reset_result = initializer.reset().await;

    match (result, reset_result) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(reset_err)) => Err(reset_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(reset_err)) => {
            log::error!("failed to reset tenant context after error: {}", reset_err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DomainError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingInitializer {
        begins: AtomicUsize,
        resets: AtomicUsize,
    }

    #[async_trait]
    impl TenantContextInitializer for RecordingInitializer {
        async fn begin(&self, _ctx: &TenantContext) -> DomainResult<()> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reset(&self) -> DomainResult<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_ctx() -> TenantContext {
        TenantContext::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn context_is_reset_after_success() {
        let init = RecordingInitializer::default();
        let result = with_tenant_context(&init, &test_ctx(), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(init.begins.load(Ordering::SeqCst), 1);
        assert_eq!(init.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn context_is_reset_after_error() {
        let init = RecordingInitializer::default();
        let result: DomainResult<()> = with_tenant_context(&init, &test_ctx(), || async {
            Err(DomainError::Internal("boom".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(init.resets.load(Ordering::SeqCst), 1);
    }
}
