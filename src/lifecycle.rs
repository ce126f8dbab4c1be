//! # VM Lifecycle
//!
//! Creates the NIC (unless it is inline) and the VM, then, unless asked to
//! keep them, deletes the VM, its disk and its NIC in that order. The VM goes
//! first because ARM refuses to delete a disk or NIC still attached to it.
//!
//! Every step waits for its operation to finish before the next begins. The
//! first error stops the run and is returned as is; nothing is rolled back.

use anyhow::Result;
use async_trait::async_trait;

use crate::azure::OperationContext;
use crate::vm::types::{NetworkInterface, VirtualMachine};
use crate::vm::{LaunchPlan, VmResources};

/// The remote operations the lifecycle drives. Each call starts the operation
/// and waits for it within `ctx`.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Returns the resource ID of the created NIC.
    async fn create_network_interface(
        &self,
        ctx: &OperationContext,
        name: &str,
        request: &NetworkInterface,
    ) -> Result<String>;

    /// Returns the resource ID of the created VM.
    async fn create_virtual_machine(
        &self,
        ctx: &OperationContext,
        name: &str,
        request: &VirtualMachine,
    ) -> Result<String>;

    async fn delete_virtual_machine(&self, ctx: &OperationContext, name: &str) -> Result<()>;

    async fn delete_disk(&self, ctx: &OperationContext, name: &str) -> Result<()>;

    async fn delete_network_interface(&self, ctx: &OperationContext, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    NicCreating,
    NicCreated,
    VmCreating,
    VmCreated,
    VmDeleting,
    VmDeleted,
    DiskDeleting,
    DiskDeleted,
    NicDeleting,
    NicDeleted,
    Done,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub resources: VmResources,
    pub vm_id: String,
    /// Only known when the NIC was created on its own.
    pub nic_id: Option<String>,
    /// Whether the resources were left running.
    pub kept: bool,
}

pub struct Lifecycle<'a, A: ResourceApi> {
    api: &'a A,
    ctx: OperationContext,
    stage: Stage,
}

impl<'a, A: ResourceApi> Lifecycle<'a, A> {
    pub fn new(api: &'a A, ctx: OperationContext) -> Self {
        Lifecycle {
            api,
            ctx,
            stage: Stage::Idle,
        }
    }

    /// Where the run is, or where it stopped if it failed.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the creation phase and, when `keep` is false, the cleanup phase.
    pub async fn run(&mut self, plan: &LaunchPlan, keep: bool) -> Result<Outcome> {
        let result = self.drive(plan, keep).await;
        if let Err(e) = &result {
            tracing::error!(
                stage = ?self.stage,
                left_behind = ?self.stranded(&plan.resources),
                "lifecycle stopped: {:#}",
                e
            );
        }
        result
    }

    async fn drive(&mut self, plan: &LaunchPlan, keep: bool) -> Result<Outcome> {
        let resources = &plan.resources;
        tracing::info!(vm = %resources.vm_name, "start creating virtual machine");

        let nic_id = match &plan.network_interface {
            Some(request) => {
                self.advance(Stage::NicCreating);
                let id = self
                    .api
                    .create_network_interface(&self.ctx, &resources.nic_name, request)
                    .await?;
                self.advance(Stage::NicCreated);
                tracing::info!(id = %id, "created network interface");
                Some(id)
            }
            None => None,
        };

        self.advance(Stage::VmCreating);
        let vm_id = self
            .api
            .create_virtual_machine(&self.ctx, &resources.vm_name, &plan.virtual_machine)
            .await?;
        self.advance(Stage::VmCreated);
        tracing::info!(id = %vm_id, "created virtual machine");

        if keep {
            tracing::info!(vm = %resources.vm_name, "keeping resources");
        } else {
            self.cleanup(resources).await?;
        }
        self.advance(Stage::Done);

        Ok(Outcome {
            resources: resources.clone(),
            vm_id,
            nic_id,
            kept: keep,
        })
    }

    async fn cleanup(&mut self, resources: &VmResources) -> Result<()> {
        tracing::info!(vm = %resources.vm_name, "start deleting virtual machine");

        self.advance(Stage::VmDeleting);
        self.api
            .delete_virtual_machine(&self.ctx, &resources.vm_name)
            .await?;
        self.advance(Stage::VmDeleted);
        tracing::info!(name = %resources.vm_name, "deleted virtual machine");

        self.advance(Stage::DiskDeleting);
        self.api.delete_disk(&self.ctx, &resources.disk_name).await?;
        self.advance(Stage::DiskDeleted);
        tracing::info!(name = %resources.disk_name, "deleted disk");

        self.advance(Stage::NicDeleting);
        self.api
            .delete_network_interface(&self.ctx, &resources.nic_name)
            .await?;
        self.advance(Stage::NicDeleted);
        tracing::info!(name = %resources.nic_name, "deleted network interface");

        Ok(())
    }

    fn advance(&mut self, stage: Stage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "lifecycle transition");
        self.stage = stage;
    }

    /// Resources that may still exist if the run stopped at the current stage.
    pub fn stranded<'r>(&self, resources: &'r VmResources) -> Vec<&'r str> {
        let vm = resources.vm_name.as_str();
        let disk = resources.disk_name.as_str();
        let nic = resources.nic_name.as_str();
        match self.stage {
            Stage::Idle | Stage::Done => vec![],
            Stage::NicCreating | Stage::NicCreated => vec![nic],
            // A failed VM creation may still have left the VM or its disk behind.
            Stage::VmCreating | Stage::VmCreated | Stage::VmDeleting => vec![vm, disk, nic],
            Stage::VmDeleted | Stage::DiskDeleting => vec![disk, nic],
            Stage::DiskDeleted | Stage::NicDeleting => vec![nic],
            Stage::NicDeleted => vec![],
        }
    }
}
