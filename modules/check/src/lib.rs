//! Unified check service.
//!
//! One entry point composes the ReBAC evaluator and the policy engine
//! behind the fingerprinted decision cache: contextual tuples first, then
//! the relation graph, then the rule scan, combined under a configurable
//! rule (default: allow iff any evaluator allows and no explicit deny rule
//! fired). The REST boundary exposes `POST /check`, `POST /check/batch`,
//! and `GET /check/health` behind `chk_` API keys or bearer JWTs.

pub mod api;
pub mod audit;
pub mod config;
pub mod domain;

pub use config::{ApiKeyConfig, CheckConfig, CombinationMode, JwtConfig, KeyScope};
pub use domain::error::CheckError;
pub use domain::model::{
    BatchRequest, BatchResult, CheckRequest, CheckResult, Permission, RebacQuery, ResourceContext,
};
pub use domain::service::CheckService;
pub use domain::subjects::{MemorySubjectDirectory, SqlSubjectDirectory, SubjectDirectory};
