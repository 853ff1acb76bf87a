use crate::HealthRes;

/// Health service shared by every API surface.
#[derive(Clone)]
pub struct HealthService;

impl HealthService {
    /// Reports the service as alive.
    ///
    /// The store has no external dependencies to check, so reaching this point is the check.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "nimbus is alive".into(),
        }
    }
}
