//! Capability Registry - namespace가 붙은 operation 목록
//!
//! 키는 `<provider>_<operation>`. 한 번 만들어진 registry는 수정하지 않고,
//! aggregator가 새 registry를 만들어 `Arc` 교체로 공개한다.

use super::handle::{OperationDescriptor, ProviderHandle};
use conductor_foundation::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// namespace 키 생성
pub fn namespaced(provider: &str, operation: &str) -> String {
    format!("{}_{}", provider, operation)
}

/// 등록된 operation
#[derive(Clone)]
pub struct RegisteredOperation {
    /// namespace 키
    pub key: String,

    /// 소유 provider 이름
    pub provider: String,

    /// 원본 operation 정보
    pub descriptor: OperationDescriptor,

    handle: Arc<dyn ProviderHandle>,
}

impl std::fmt::Debug for RegisteredOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredOperation")
            .field("key", &self.key)
            .field("provider", &self.provider)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// namespace가 붙은 operation registry
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    operations: BTreeMap<String, RegisteredOperation>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// provider의 operation들을 등록하고 실제로 등록된 키 목록을 반환
    ///
    /// 이미 있는 키는 유지하고 나중 것은 건너뛴다.
    pub(crate) fn register_provider(
        &mut self,
        provider: &str,
        handle: &Arc<dyn ProviderHandle>,
        operations: Vec<OperationDescriptor>,
    ) -> Vec<String> {
        let mut registered = Vec::with_capacity(operations.len());

        for descriptor in operations {
            let key = namespaced(provider, &descriptor.name);
            if let Some(existing) = self.operations.get(&key) {
                warn!(
                    provider = %provider,
                    operation = %descriptor.name,
                    key = %key,
                    owner = %existing.provider,
                    "Namespaced operation collides with an existing one, skipping"
                );
                continue;
            }

            debug!(provider = %provider, key = %key, "Registered operation");
            self.operations.insert(
                key.clone(),
                RegisteredOperation {
                    key: key.clone(),
                    provider: provider.to_string(),
                    descriptor,
                    handle: Arc::clone(handle),
                },
            );
            registered.push(key);
        }

        registered
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.operations.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&RegisteredOperation> {
        self.operations.get(key)
    }

    /// 정렬된 namespace 키 목록
    pub fn names(&self) -> Vec<String> {
        self.operations.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredOperation> {
        self.operations.values()
    }

    /// 특정 provider의 operation 목록
    pub fn by_provider<'a>(
        &'a self,
        provider: &'a str,
    ) -> impl Iterator<Item = &'a RegisteredOperation> + 'a {
        self.operations
            .values()
            .filter(move |op| op.provider == provider)
    }

    /// namespace 키로 operation 호출
    pub async fn call(&self, key: &str, arguments: Value) -> Result<Value> {
        let op = self
            .operations
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("operation '{}'", key)))?;

        debug!(provider = %op.provider, key = %key, "Calling operation");
        op.handle.call(&op.descriptor.name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_foundation::TransportKind;
    use serde_json::json;

    struct EchoHandle;

    #[async_trait]
    impl ProviderHandle for EchoHandle {
        fn transport_kind(&self) -> TransportKind {
            TransportKind::Subprocess
        }

        async fn list_operations(&self) -> Result<Vec<OperationDescriptor>> {
            Ok(vec![])
        }

        async fn call(&self, operation: &str, arguments: Value) -> Result<Value> {
            Ok(json!({ "operation": operation, "arguments": arguments }))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn ops(names: &[&str]) -> Vec<OperationDescriptor> {
        names.iter().map(|n| OperationDescriptor::new(*n)).collect()
    }

    #[test]
    fn test_first_registration_wins_on_collision() {
        let handle: Arc<dyn ProviderHandle> = Arc::new(EchoHandle);
        let mut registry = CapabilityRegistry::new();

        // "a" + "b_c" and "a_b" + "c" both map to "a_b_c"
        let first = registry.register_provider("a", &handle, ops(&["b_c", "x"]));
        let second = registry.register_provider("a_b", &handle, ops(&["c"]));

        assert_eq!(first, vec!["a_b_c", "a_x"]);
        assert!(second.is_empty());
        assert_eq!(registry.get("a_b_c").unwrap().provider, "a");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_call_routes_with_original_name() {
        let handle: Arc<dyn ProviderHandle> = Arc::new(EchoHandle);
        let mut registry = CapabilityRegistry::new();
        registry.register_provider("github", &handle, ops(&["create_issue"]));

        let result = registry
            .call("github_create_issue", json!({"title": "bug"}))
            .await
            .unwrap();
        assert_eq!(result["operation"], "create_issue");
        assert_eq!(result["arguments"]["title"], "bug");
    }

    #[tokio::test]
    async fn test_call_unknown_is_not_found() {
        let registry = CapabilityRegistry::new();
        let err = registry.call("nope_op", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_by_provider() {
        let handle: Arc<dyn ProviderHandle> = Arc::new(EchoHandle);
        let mut registry = CapabilityRegistry::new();
        registry.register_provider("fs", &handle, ops(&["read", "write"]));
        registry.register_provider("git", &handle, ops(&["status"]));

        assert_eq!(registry.by_provider("fs").count(), 2);
        assert_eq!(registry.names(), vec!["fs_read", "fs_write", "git_status"]);
    }
}
