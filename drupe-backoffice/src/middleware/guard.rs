use crate::middleware::gate::RequestContext;
use crate::services::authz::{authorize, Capability, Denial};
use crate::services::metrics;
use axum::{
    extract::{FromRequestParts, RawPathParams, Request},
    middleware::Next,
    response::Response,
};
use drupe_core::error::{AppError, GateReason};

/// How a route binds its target branch for authorization.
#[derive(Debug, Clone, Copy)]
pub enum BranchRule {
    /// No branch in play; capability check only.
    None,
    /// Branch comes from the `:branch_id` path segment.
    Path,
    /// Branch is the session's selected branch; none selected is a deny.
    Selected,
}

fn deny(reason: GateReason) -> AppError {
    metrics::record_gate_denial(reason.as_str());
    AppError::gate(reason)
}

/// Route guard; layered per route so the required capability and branch
/// rule live in the route registration, not the handler body.
pub async fn enforce(
    capability: Capability,
    rule: BranchRule,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();

    let ctx = parts
        .extensions
        .get::<RequestContext>()
        .cloned()
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "request context missing; guard mounted outside the gate"
            ))
        })?;

    let target_branch = match rule {
        BranchRule::None => None,
        BranchRule::Selected => match ctx.session.selected_branch_id.clone() {
            Some(branch_id) => Some(branch_id),
            None => return Err(deny(GateReason::BranchNotSelected)),
        },
        BranchRule::Path => {
            let params = RawPathParams::from_request_parts(&mut parts, &())
                .await
                .map_err(|e| {
                    AppError::InternalError(anyhow::anyhow!("path params unavailable: {}", e))
                })?;
            let branch_id = params
                .iter()
                .find(|(key, _)| *key == "branch_id")
                .map(|(_, value)| value.to_string());
            match branch_id {
                Some(branch_id) => Some(branch_id),
                None => {
                    return Err(AppError::InternalError(anyhow::anyhow!(
                        "route declared a path branch rule without :branch_id"
                    )))
                }
            }
        }
    };

    match authorize(&ctx.principal, capability, target_branch.as_deref()) {
        Ok(()) => {
            let req = Request::from_parts(parts, body);
            Ok(next.run(req).await)
        }
        Err(denial) => {
            // Same outward code either way; the log carries the difference.
            match denial {
                Denial::Capability => tracing::warn!(
                    principal_id = %ctx.principal.id,
                    role = ?ctx.principal.role,
                    capability = capability.as_str(),
                    "Authorization denied: capability not granted"
                ),
                Denial::BranchScope => tracing::warn!(
                    principal_id = %ctx.principal.id,
                    role = ?ctx.principal.role,
                    capability = capability.as_str(),
                    target_branch = target_branch.as_deref().unwrap_or(""),
                    "Authorization denied: branch out of scope"
                ),
            }
            Err(deny(GateReason::Forbidden))
        }
    }
}
