pub mod gate;
pub mod guard;
pub mod metrics;

pub use gate::{gate_middleware, Ctx, RequestContext};
pub use guard::{enforce, BranchRule};
pub use metrics::metrics_middleware;
