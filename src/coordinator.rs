//! Cache Coordinator
//!
//! Implements the two-phase entry lifecycle behind the cache RPCs:
//!
//! ```text
//! Absent --CreateEntry--> Pending(uploadID) --UpdateEntry--> Committed
//! ```
//!
//! A pending record is keyed by its upload id (under `pending_key`, so no
//! other record kind is reachable through it) and expires on its own if the
//! client never reports completion. The committed record lives under the
//! stable key and is the only version `CheckEntry`/`GetEntry` can see.
//!
//! Under `CommitPolicy::Overwrite` the duplicate check in `CreateEntry` is
//! best effort: two creates racing for one key both succeed and the last
//! `UpdateEntry` wins. `CommitPolicy::Lease` closes that window with a
//! unique-create lease on the stable key.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::auth::{TenantAuthorizer, VerifiedCaller};
use crate::config::{CommitPolicy, Config};
use crate::error::{CacheError, Result};
use crate::index::{
    lease_key, pending_key, stable_key, tenant_id_key, tenant_key, CacheRecord, Index,
    LeaseRecord, TenantRecord,
};
use crate::models::{
    CheckEntryRequest, CheckEntryResponse, CreateEntryRequest, CreateEntryResponse,
    CreateTenantRequest, CreateTenantResponse, GetEntryRequest, GetEntryResponse,
    GetTenantRequest, GetTenantResponse, UpdateEntryRequest, UpdateEntryResponse,
};
use crate::planner::TransferPlanner;
use crate::storage::{CompletedPart, ObjectStore};
use crate::telemetry::TraceContext;

/// Record lifetimes and the commit guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub pending_ttl: Duration,
    pub committed_ttl: Duration,
    pub commit_policy: CommitPolicy,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            pending_ttl: config.pending_ttl(),
            committed_ttl: config.committed_ttl(),
            commit_policy: config.commit_policy,
        }
    }
}

fn check(validation: Option<String>) -> Result<()> {
    match validation {
        Some(msg) => Err(CacheError::InvalidRequest(msg)),
        None => Ok(()),
    }
}

// == Cache Coordinator ==
#[derive(Clone)]
pub struct CacheCoordinator {
    index: Index,
    tenants: TenantAuthorizer,
    objects: Arc<dyn ObjectStore>,
    planner: TransferPlanner,
    settings: CoordinatorSettings,
}

impl CacheCoordinator {
    pub fn new(
        index: Index,
        objects: Arc<dyn ObjectStore>,
        planner: TransferPlanner,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            tenants: TenantAuthorizer::new(index.clone()),
            index,
            objects,
            planner,
            settings,
        }
    }

    async fn committed(&self, ctx: &TraceContext, stable: &str) -> Result<Option<CacheRecord>> {
        self.index
            .exists_as::<CacheRecord>(stable)
            .instrument(ctx.child("index.exists"))
            .await
    }

    // == Check Entry ==
    /// Reports whether a committed version exists and its checksum.
    pub async fn check_entry(
        &self,
        ctx: &TraceContext,
        caller: Option<&VerifiedCaller>,
        req: &CheckEntryRequest,
    ) -> Result<CheckEntryResponse> {
        check(req.validate())?;
        self.tenants
            .authorize(caller, &req.owner, req.provider_type)
            .instrument(ctx.child("tenant.authorize"))
            .await?;

        let stable = stable_key(&req.owner, req.provider_type, &req.key);
        Ok(match self.committed(ctx, &stable).await? {
            Some(record) => CheckEntryResponse {
                exists: true,
                sha256: record.sha256,
            },
            None => CheckEntryResponse {
                exists: false,
                sha256: String::new(),
            },
        })
    }

    // == Create Entry ==
    /// Opens a pending upload and returns its transfer instructions.
    pub async fn create_entry(
        &self,
        ctx: &TraceContext,
        caller: Option<&VerifiedCaller>,
        req: &CreateEntryRequest,
    ) -> Result<CreateEntryResponse> {
        check(req.validate())?;
        self.tenants
            .authorize(caller, &req.owner, req.provider_type)
            .instrument(ctx.child("tenant.authorize"))
            .await?;

        let entry = &req.cache_entry;
        let stable = stable_key(&req.owner, req.provider_type, &entry.key);
        if self.committed(ctx, &stable).await?.is_some() {
            return Err(CacheError::AlreadyExists(stable));
        }

        let upload_id = Uuid::new_v4().to_string();
        let lease = lease_key(&stable);
        if self.settings.commit_policy == CommitPolicy::Lease {
            let record = LeaseRecord {
                upload_id: upload_id.clone(),
                acquired_at: Utc::now(),
            };
            self.index
                .put_as(&lease, &record, Some(self.settings.pending_ttl), true)
                .instrument(ctx.child("index.put"))
                .await
                .map_err(|e| match e {
                    CacheError::AlreadyExists(_) => {
                        CacheError::AlreadyExists(format!("{} has an upload in progress", stable))
                    }
                    other => other,
                })?;
        }

        let pending = self.open_upload(ctx, caller, req, &stable, &upload_id).await;
        if pending.is_err() && self.settings.commit_policy == CommitPolicy::Lease {
            if let Err(e) = self.index.delete(&lease).await {
                warn!(lease = %lease, error = %e, "failed to release upload lease");
            }
        }
        let response = pending?;

        info!(
            owner = %req.owner,
            key = %entry.key,
            upload_id = %upload_id,
            parts = response.upload_instructions.len(),
            "created pending entry"
        );
        Ok(response)
    }

    async fn open_upload(
        &self,
        ctx: &TraceContext,
        caller: Option<&VerifiedCaller>,
        req: &CreateEntryRequest,
        stable: &str,
        upload_id: &str,
    ) -> Result<CreateEntryResponse> {
        let entry = &req.cache_entry;
        let plan = self
            .planner
            .plan_upload(stable, &entry.sha256, &entry.compression, entry.file_size)
            .instrument(ctx.child("planner.plan_upload"))
            .await?;

        let mut record = CacheRecord::from_entry(
            &req.owner,
            req.provider_type,
            entry,
            caller.map(|c| c.identity.clone()),
        );
        record.multipart_upload_id = plan.multipart_upload_id.clone();

        self.index
            .put_as(&pending_key(upload_id), &record, Some(self.settings.pending_ttl), false)
            .instrument(ctx.child("index.put"))
            .await?;

        Ok(CreateEntryResponse {
            id: upload_id.to_string(),
            multipart: plan.is_multipart(),
            upload_instructions: plan.instructions,
        })
    }

    // == Update Entry ==
    /// Completes a pending upload and commits it under the stable key.
    pub async fn update_entry(
        &self,
        ctx: &TraceContext,
        caller: Option<&VerifiedCaller>,
        req: &UpdateEntryRequest,
    ) -> Result<UpdateEntryResponse> {
        check(req.validate())?;

        let mut record: CacheRecord = self
            .index
            .get_as(&pending_key(&req.id))
            .instrument(ctx.child("index.get"))
            .await?;
        if caller.is_some() {
            self.tenants
                .authorize(caller, &record.owner, record.provider_type)
                .instrument(ctx.child("tenant.authorize"))
                .await?;
        }
        if !req.key.is_empty() && req.key != record.id {
            return Err(CacheError::InvalidRequest(
                "Key does not match the pending upload".to_string(),
            ));
        }

        let stable = stable_key(&record.owner, record.provider_type, &record.id);
        let lease = lease_key(&stable);
        if self.settings.commit_policy == CommitPolicy::Lease {
            let holder = self
                .index
                .exists_as::<LeaseRecord>(&lease)
                .instrument(ctx.child("index.exists"))
                .await?;
            if let Some(holder) = holder.filter(|h| h.upload_id != req.id) {
                return Err(CacheError::AlreadyExists(format!(
                    "{} is leased by upload {}",
                    stable, holder.upload_id
                )));
            }
        }

        if let Some(multipart_upload_id) = record.multipart_upload_id.take() {
            if req.multipart_etags.is_empty() {
                return Err(CacheError::InvalidRequest(
                    "Multipart upload requires part ETags".to_string(),
                ));
            }
            let mut parts: Vec<CompletedPart> = req
                .multipart_etags
                .iter()
                .map(|e| CompletedPart {
                    part: e.part,
                    etag: e.etag.clone(),
                })
                .collect();
            parts.sort_by_key(|p| p.part);

            self.objects
                .complete_multipart_upload(&stable, &multipart_upload_id, &parts)
                .instrument(ctx.child("objects.complete_multipart_upload"))
                .await?;
        }

        if !req.name.is_empty() {
            record.name = req.name.clone();
        }
        if !req.branch.is_empty() {
            record.branch = req.branch.clone();
        }
        record.updated_at = Utc::now();

        self.index
            .put_as(&stable, &record, Some(self.settings.committed_ttl), false)
            .instrument(ctx.child("index.put"))
            .await?;

        if self.settings.commit_policy == CommitPolicy::Lease {
            self.index
                .delete(&lease)
                .instrument(ctx.child("index.delete"))
                .await?;
        }

        info!(upload_id = %req.id, key = %stable, "committed entry");
        Ok(UpdateEntryResponse { id: req.id.clone() })
    }

    // == Get Entry ==
    /// Returns the committed entry with download instructions sized from
    /// the stored object.
    pub async fn get_entry(
        &self,
        ctx: &TraceContext,
        caller: Option<&VerifiedCaller>,
        req: &GetEntryRequest,
    ) -> Result<GetEntryResponse> {
        check(req.validate())?;
        self.tenants
            .authorize(caller, &req.owner, req.provider_type)
            .instrument(ctx.child("tenant.authorize"))
            .await?;

        let stable = stable_key(&req.owner, req.provider_type, &req.key);
        let record = self
            .committed(ctx, &stable)
            .await?
            .ok_or_else(|| CacheError::NotFound(stable.clone()))?;

        let meta = self
            .objects
            .head_object(&stable)
            .instrument(ctx.child("objects.head"))
            .await?
            .ok_or_else(|| {
                warn!(key = %stable, "committed record has no stored object");
                CacheError::NotFound(stable.clone())
            })?;
        if let Some(actual) = meta.sha256.as_deref() {
            if !actual.eq_ignore_ascii_case(&record.sha256) {
                warn!(
                    key = %stable,
                    recorded = %record.sha256,
                    stored = %actual,
                    "stored object checksum differs from record"
                );
            }
        }

        let instructions = self
            .planner
            .plan_download(&stable, meta.size)
            .instrument(ctx.child("planner.plan_download"))
            .await?;

        let mut cache_entry = record.to_entry();
        cache_entry.file_size = meta.size;
        Ok(GetEntryResponse {
            cache_entry,
            multipart: instructions.iter().any(|i| i.offset.is_some()),
            download_instructions: instructions,
        })
    }

    // == Tenants ==
    /// Provisions a tenant. Both the (provider, owner) pair and the id must
    /// be unused.
    pub async fn create_tenant(
        &self,
        ctx: &TraceContext,
        req: &CreateTenantRequest,
    ) -> Result<CreateTenantResponse> {
        check(req.validate())?;

        let record = TenantRecord {
            id: req.id.clone(),
            provider_type: req.provider_type,
            owner: req.owner.clone(),
            created_at: Utc::now(),
        };
        let primary = tenant_key(req.provider_type, &req.owner);
        self.index
            .put_as(&primary, &record, None, true)
            .instrument(ctx.child("index.put"))
            .await?;

        if let Err(e) = self
            .index
            .put_as(&tenant_id_key(&req.id), &record, None, true)
            .instrument(ctx.child("index.put"))
            .await
        {
            if let Err(cleanup) = self.index.delete(&primary).await {
                warn!(key = %primary, error = %cleanup, "failed to roll back tenant record");
            }
            return Err(e);
        }

        info!(tenant = %req.id, owner = %req.owner, provider = %req.provider_type, "provisioned tenant");
        Ok(CreateTenantResponse { id: req.id.clone() })
    }

    pub async fn get_tenant(
        &self,
        ctx: &TraceContext,
        req: &GetTenantRequest,
    ) -> Result<GetTenantResponse> {
        if req.id.is_empty() {
            return Err(CacheError::InvalidRequest(
                "Tenant id cannot be empty".to_string(),
            ));
        }

        let record: TenantRecord = self
            .index
            .get_as(&tenant_id_key(&req.id))
            .instrument(ctx.child("index.get"))
            .await?;
        Ok(GetTenantResponse {
            id: record.id,
            provider_type: record.provider_type,
            owner: record.owner,
            created_at: record.created_at,
        })
    }
}
