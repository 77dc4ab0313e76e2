//! Camera acquisition with tiered constraints.

use crate::error::{ErrorKind, Result};
use crate::host::{Camera, CameraStream, Constraints, HostFault};
use crate::settings::ScanOptions;
use std::time::Duration;

/// Constraint tiers to try, most demanding first.
pub fn constraint_tiers(options: &ScanOptions) -> Vec<Constraints> {
    if options.advanced_constraints {
        vec![Constraints::advanced(), Constraints::basic()]
    } else {
        vec![Constraints::basic()]
    }
}

/// Open the camera with the first constraint tier the host accepts.
///
/// Each tier gets its own `timeout`. A permission refusal ends the search
/// immediately; any other fault moves on to the next tier. When every tier fails, the last
/// fault decides the classification.
pub async fn acquire(camera: &dyn Camera, tiers: &[Constraints], timeout: Duration) -> Result<Box<dyn CameraStream>> {
    let mut last_fault = HostFault::NotFound;
    for (tier, constraints) in tiers.iter().enumerate() {
        let fault = match tokio::time::timeout(timeout, camera.open(constraints)).await {
            Ok(Ok(stream)) => {
                tracing::debug!(tier, stream = stream.id(), "camera acquired");
                return Ok(stream);
            },
            Ok(Err(fault)) => fault,
            Err(_elapsed) => HostFault::Timeout,
        };
        if matches!(fault, HostFault::NotAllowed | HostFault::Security) {
            exn::bail!(ErrorKind::PermissionDenied);
        }
        tracing::warn!(tier, fault = %fault, "camera constraints rejected");
        last_fault = fault;
    }
    exn::bail!(ErrorKind::from_camera_fault(&last_fault));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCamera, OpenOutcome};

    #[tokio::test]
    async fn falls_back_to_basic_constraints() {
        let camera = MockCamera::default().with_open_outcomes([OpenOutcome::Fail(HostFault::Overconstrained)]);
        let tiers = constraint_tiers(&ScanOptions::default());

        let stream = acquire(&camera, &tiers, Duration::from_secs(1)).await.unwrap();

        assert_eq!(camera.opened(), vec![Constraints::advanced(), Constraints::basic()]);
        stream.stop();
        assert_eq!(camera.active_streams(), 0);
    }

    #[tokio::test]
    async fn permission_denial_is_not_retried() {
        let camera = MockCamera::default().with_open_outcomes([OpenOutcome::Fail(HostFault::NotAllowed)]);
        let tiers = constraint_tiers(&ScanOptions::default());

        let Err(err) = acquire(&camera, &tiers, Duration::from_secs(1)).await else {
            panic!("acquisition should fail");
        };

        assert_eq!(*err, ErrorKind::PermissionDenied);
        assert_eq!(camera.opened().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_acquisition_times_out_as_camera_in_use() {
        let camera = MockCamera::default().with_open_outcomes([OpenOutcome::Hang, OpenOutcome::Hang]);
        let tiers = constraint_tiers(&ScanOptions::default());

        let Err(err) = acquire(&camera, &tiers, Duration::from_secs(10)).await else {
            panic!("acquisition should fail");
        };

        assert_eq!(*err, ErrorKind::CameraInUse);
    }

    #[tokio::test]
    async fn last_fault_classifies_the_failure() {
        let camera = MockCamera::default()
            .with_open_outcomes([OpenOutcome::Fail(HostFault::NotReadable), OpenOutcome::Fail(HostFault::NotFound)]);
        let tiers = constraint_tiers(&ScanOptions::default());

        let Err(err) = acquire(&camera, &tiers, Duration::from_secs(1)).await else {
            panic!("acquisition should fail");
        };

        assert_eq!(*err, ErrorKind::NoCameraFound);
    }

    #[test]
    fn basic_only_when_advanced_disabled() {
        let options = ScanOptions { advanced_constraints: false, ..ScanOptions::default() };
        assert_eq!(constraint_tiers(&options), vec![Constraints::basic()]);
    }
}
