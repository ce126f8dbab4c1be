use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::azure::client::{ArmClient, ResourceKind, resource_id};
use crate::azure::lro::OperationContext;
use crate::lifecycle::ResourceApi;
use crate::vm::types::{NetworkInterface, VirtualMachine};

/// [`ResourceApi`] backed by Azure Resource Manager, scoped to one resource group.
pub struct AzureApi {
    client: ArmClient,
    resource_group: String,
}

impl AzureApi {
    pub fn new(client: ArmClient, resource_group: &str) -> Self {
        AzureApi {
            client,
            resource_group: resource_group.to_string(),
        }
    }

    async fn create<T: serde::Serialize + Sync>(
        &self,
        ctx: &OperationContext,
        kind: ResourceKind,
        name: &str,
        request: &T,
    ) -> Result<String> {
        let url = self.client.resource_url(&self.resource_group, kind, name);
        let body = ctx
            .run(name, async {
                let poller = self.client.begin_create_or_update(&url, request).await?;
                poller.poll_until_done().await
            })
            .await?;
        Ok(self.returned_id(&body, kind, name))
    }

    async fn delete(&self, ctx: &OperationContext, kind: ResourceKind, name: &str) -> Result<()> {
        let url = self.client.resource_url(&self.resource_group, kind, name);
        ctx.run(name, async {
            let poller = self.client.begin_delete(&url).await?;
            poller.poll_until_done().await
        })
        .await?;
        Ok(())
    }

    /// The ID ARM reported, or the one derived from the name if the body lacks it.
    fn returned_id(&self, body: &Value, kind: ResourceKind, name: &str) -> String {
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                resource_id(
                    self.client.subscription_id(),
                    &self.resource_group,
                    kind,
                    name,
                )
            })
    }
}

#[async_trait]
impl ResourceApi for AzureApi {
    async fn create_network_interface(
        &self,
        ctx: &OperationContext,
        name: &str,
        request: &NetworkInterface,
    ) -> Result<String> {
        self.create(ctx, ResourceKind::NetworkInterface, name, request)
            .await
    }

    async fn create_virtual_machine(
        &self,
        ctx: &OperationContext,
        name: &str,
        request: &VirtualMachine,
    ) -> Result<String> {
        self.create(ctx, ResourceKind::VirtualMachine, name, request)
            .await
    }

    async fn delete_virtual_machine(&self, ctx: &OperationContext, name: &str) -> Result<()> {
        self.delete(ctx, ResourceKind::VirtualMachine, name).await
    }

    async fn delete_disk(&self, ctx: &OperationContext, name: &str) -> Result<()> {
        self.delete(ctx, ResourceKind::Disk, name).await
    }

    async fn delete_network_interface(&self, ctx: &OperationContext, name: &str) -> Result<()> {
        self.delete(ctx, ResourceKind::NetworkInterface, name).await
    }
}
