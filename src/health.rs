//! Health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Can it serve collection traffic? |
//!
//! [`app`](crate::app) registers both.

use crate::{Request, Response};

/// Always `200 OK` with body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"`. Instances are spawned lazily on first use,
/// so there is nothing to warm up before accepting traffic.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
