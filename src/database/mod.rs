pub mod tenant;

pub use tenant::{
    with_tenant_context, PgTenantContextInitializer, TenantContext, TenantContextInitializer,
};
