//! The unified check orchestrator.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::instrument;

use authrim_cache::RequestCache;
use authrim_policy::{PolicyContext, PolicyEngine, ResourceAttributes};
use authrim_rebac::{RebacCheck, RebacError, RebacEvaluator};

use crate::audit;
use crate::config::{CheckConfig, CombinationMode};

use super::error::CheckError;
use super::model::{BatchRequest, BatchResult, CheckRequest, CheckResult, Permission};
use super::subjects::SubjectDirectory;

/// Composes the ReBAC evaluator and the policy engine into one decision.
pub struct CheckService {
    rebac: Arc<RebacEvaluator>,
    policy: Arc<PolicyEngine>,
    subjects: Arc<dyn SubjectDirectory>,
    config: CheckConfig,
}

impl CheckService {
    #[must_use]
    pub fn new(
        rebac: Arc<RebacEvaluator>,
        policy: Arc<PolicyEngine>,
        subjects: Arc<dyn SubjectDirectory>,
        config: CheckConfig,
    ) -> Self {
        Self {
            rebac,
            policy,
            subjects,
            config,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Run one check.
    ///
    /// # Errors
    ///
    /// [`CheckError::FeatureDisabled`] behind the gate,
    /// [`CheckError::InvalidPermission`] for a malformed permission, and
    /// storage errors unless `strict_storage` turns them into denies.
    #[instrument(skip_all, fields(subject = %req.subject_id, permission = %req.permission))]
    pub async fn check(&self, req: &CheckRequest) -> Result<CheckResult, CheckError> {
        if !self.config.enabled {
            return Err(CheckError::FeatureDisabled);
        }
        let permission = Permission::parse(&req.permission)?;
        let request_cache = RequestCache::new();
        self.evaluate_one(req, &permission, &request_cache).await
    }

    /// Run up to `max_batch` checks in order under one request cache.
    ///
    /// With `stop_on_deny` the batch halts at the first deny and reports
    /// its index alongside the partial results.
    ///
    /// # Errors
    ///
    /// [`CheckError::BatchTooLarge`] over the cap; otherwise as
    /// [`Self::check`].
    #[instrument(skip_all, fields(len = batch.checks.len(), stop_on_deny = batch.stop_on_deny))]
    pub async fn batch_check(&self, batch: &BatchRequest) -> Result<BatchResult, CheckError> {
        if !self.config.enabled {
            return Err(CheckError::FeatureDisabled);
        }
        if batch.checks.len() > self.config.max_batch {
            return Err(CheckError::BatchTooLarge {
                len: batch.checks.len(),
                max: self.config.max_batch,
            });
        }

        let request_cache = RequestCache::new();
        let mut results = Vec::with_capacity(batch.checks.len());
        let mut stopped_at = None;
        for (index, item) in batch.checks.iter().enumerate() {
            let permission = Permission::parse(&item.permission)?;
            let result = self.evaluate_one(item, &permission, &request_cache).await?;
            let denied = !result.allowed;
            results.push(result);
            if batch.stop_on_deny && denied {
                stopped_at = Some(index);
                break;
            }
        }
        Ok(BatchResult { results, stopped_at })
    }

    async fn evaluate_one(
        &self,
        req: &CheckRequest,
        permission: &Permission,
        request_cache: &RequestCache,
    ) -> Result<CheckResult, CheckError> {
        let tenant = req
            .tenant_id
            .clone()
            .unwrap_or_else(|| self.config.default_tenant.clone());
        let mut resolved_via = Vec::new();

        // ReBAC leg, when requested.
        let mut rebac_allowed = None;
        if let Some(query) = &req.rebac {
            let rebac_req = RebacCheck {
                tenant: tenant.clone(),
                subject: self.qualified_subject(req),
                relation: query.relation.clone(),
                object: query.object.clone(),
                object_type: query.object_type.clone(),
                context_tuples: query.context_tuples.clone(),
            };
            match self.rebac.check(&rebac_req, Some(request_cache)).await {
                Ok(outcome) => {
                    resolved_via.push(outcome.resolved_via.to_string());
                    rebac_allowed = Some(outcome.allowed);
                }
                Err(RebacError::Storage(err)) if self.config.strict_storage => {
                    tracing::warn!(error = %err, "storage failed under strict mode; denying");
                    return Ok(CheckResult::denied(
                        vec!["storage_error".to_owned()],
                        self.config.cache_ttl_secs,
                    ));
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Policy leg.
        let subject = match self.subjects.load(&tenant, &req.subject_id).await {
            Ok(subject) => subject,
            Err(CheckError::Storage(err)) if self.config.strict_storage => {
                tracing::warn!(error = %err, "profile load failed under strict mode; denying");
                return Ok(CheckResult::denied(
                    vec!["storage_error".to_owned()],
                    self.config.cache_ttl_secs,
                ));
            }
            Err(err) => return Err(err),
        };
        let ctx = self.policy_context(req, permission, subject);
        let decision = self.policy.evaluate(&ctx);

        let explicit = decision.decided_by != "default";
        resolved_via.push(if explicit {
            format!("policy:{}", decision.decided_by)
        } else {
            "default".to_owned()
        });

        let explicit_deny = explicit && !decision.allowed;
        let any_allow = rebac_allowed == Some(true) || decision.allowed;
        let allowed = match self.config.combination {
            CombinationMode::AnyAllowNoDeny => any_allow && !explicit_deny,
            CombinationMode::AllMustAllow => {
                let rebac_ok = req.rebac.is_none() || rebac_allowed == Some(true);
                rebac_ok && decision.allowed
            }
        };

        let result = CheckResult {
            allowed,
            resolved_via,
            final_decision: if allowed { "allow" } else { "deny" }.to_owned(),
            cache_ttl: self.config.cache_ttl_secs,
            debug: Some(json!({
                "policy_reason": decision.reason,
                "rebac": rebac_allowed,
            })),
        };
        audit::emit_decision(&tenant, &req.subject_id, &req.permission, &result);
        Ok(result)
    }

    /// Qualify a bare subject id with the declared subject type.
    fn qualified_subject(&self, req: &CheckRequest) -> String {
        match (&req.subject_type, req.subject_id.contains(':')) {
            (Some(subject_type), false) => format!("{subject_type}:{}", req.subject_id),
            _ => req.subject_id.clone(),
        }
    }

    fn policy_context(
        &self,
        req: &CheckRequest,
        permission: &Permission,
        subject: authrim_policy::SubjectAttributes,
    ) -> PolicyContext {
        let mut subject = subject;
        if subject.user_type.is_none() {
            subject.user_type = req.subject_type.clone();
        }

        let mut resource = ResourceAttributes {
            resource_type: Some(permission.resource.clone()),
            id: permission.id.clone(),
            ..Default::default()
        };
        let mut environment = authrim_policy::Environment::default();
        if let Some(context) = &req.resource_context {
            resource.owner_id = context.owner_id.clone();
            resource.org_id = context.org_id.clone();
            resource.properties = context.properties.clone();
            environment = context.environment.clone();
        }

        PolicyContext {
            subject,
            resource,
            action: permission.action.clone(),
            environment,
            timestamp: Utc::now(),
        }
    }
}
