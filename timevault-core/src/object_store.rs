use crate::{Result, VaultError};
use std::path::{Path, PathBuf};

/// 本地文件系统对象存储
/// 对象键约定为 {tenant_id}/{job_id}-backup，该寻址方式是恢复兼容性契约的一部分
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// 创建对象存储，根目录不存在时自动创建
    pub fn new(root: PathBuf) -> Result<Self> {
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self { root })
    }

    /// 备份对象键：{tenant_id}/{job_id}-backup
    pub fn backup_key(tenant_id: &str, job_id: &str) -> String {
        format!("{tenant_id}/{job_id}-backup")
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // 键只允许单层 {tenant}/{object} 结构，防止路径逃逸
        let mut parts = key.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(tenant), Some(object), None)
                if !tenant.is_empty()
                    && !object.is_empty()
                    && !tenant.contains("..")
                    && !object.contains("..") =>
            {
                Ok(self.root.join(tenant).join(object))
            }
            _ => Err(VaultError::object_store(format!("非法的对象键: {key}"))),
        }
    }

    /// 写入对象
    pub async fn put(&self, key: &str, payload: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, payload).await?;

        tracing::debug!("对象已写入: {} ({} 字节)", key, payload.len());
        Ok(())
    }

    /// 读取对象
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Err(VaultError::object_store(format!("对象不存在: {key}")));
        }
        Ok(tokio::fs::read(&path).await?)
    }

    /// 删除对象（不存在时视为成功）
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
            tracing::info!("对象已删除: {}", key);
        }
        Ok(())
    }

    /// 判断对象是否存在
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.exists())
    }

    /// 获取存储根目录
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let temp_dir = tempdir().unwrap();
        let store = LocalObjectStore::new(temp_dir.path().to_path_buf()).unwrap();

        let key = LocalObjectStore::backup_key("tenant-a", "job-1");
        store.put(&key, b"hello").await.unwrap();
        assert!(store.exists(&key).await.unwrap());

        let data = store.get(&key).await.unwrap();
        assert_eq!(data, b"hello");

        store.delete(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
        assert!(store.get(&key).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_bad_keys() {
        let temp_dir = tempdir().unwrap();
        let store = LocalObjectStore::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(store.put("no-slash", b"x").await.is_err());
        assert!(store.put("a/b/c", b"x").await.is_err());
        assert!(store.put("../escape/x", b"x").await.is_err());
    }
}
