use crate::db::{Database, Tenant, TenantStatus};
use crate::{Result, VaultError};
use chrono::Utc;

/// 租户解析器
/// 身份与权限机制由外部系统负责，这里只消费已解析的租户ID，
/// 校验租户存在且处于活跃状态
#[derive(Debug, Clone)]
pub struct TenantResolver {
    database: Database,
}

impl TenantResolver {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// 解析租户并校验其可用性
    pub async fn resolve(&self, tenant_id: &str) -> Result<Tenant> {
        if tenant_id.trim().is_empty() {
            return Err(VaultError::validation("租户ID不能为空"));
        }

        let tenant = self
            .database
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| VaultError::TenantNotFound(tenant_id.to_string()))?;

        if tenant.status == TenantStatus::Suspended {
            return Err(VaultError::TenantSuspended(tenant_id.to_string()));
        }

        Ok(tenant)
    }

    /// 注册或更新租户（供外围系统与CLI使用）
    pub async fn register(&self, tenant_id: &str, name: &str, status: TenantStatus) -> Result<()> {
        self.database
            .upsert_tenant(Tenant {
                id: tenant_id.to_string(),
                name: name.to_string(),
                status,
                created_at: Utc::now(),
            })
            .await
    }

    /// 列出所有活跃租户
    pub async fn list_active(&self) -> Result<Vec<Tenant>> {
        self.database.list_active_tenants().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_unknown_tenant() {
        let db = Database::connect_memory().await.unwrap();
        let resolver = TenantResolver::new(db);

        let result = resolver.resolve("ghost").await;
        assert!(matches!(result, Err(VaultError::TenantNotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_suspended_tenant() {
        let db = Database::connect_memory().await.unwrap();
        let resolver = TenantResolver::new(db);

        resolver
            .register("tenant-a", "甲方", TenantStatus::Suspended)
            .await
            .unwrap();

        let result = resolver.resolve("tenant-a").await;
        assert!(matches!(result, Err(VaultError::TenantSuspended(_))));
    }

    #[tokio::test]
    async fn test_resolve_active_tenant() {
        let db = Database::connect_memory().await.unwrap();
        let resolver = TenantResolver::new(db);

        resolver
            .register("tenant-a", "甲方", TenantStatus::Active)
            .await
            .unwrap();

        let tenant = resolver.resolve("tenant-a").await.unwrap();
        assert_eq!(tenant.id, "tenant-a");
        assert_eq!(tenant.status, TenantStatus::Active);
    }
}
