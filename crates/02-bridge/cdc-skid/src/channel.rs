use cdc_ring::slot_ring;

use crate::config::CdcConfig;
use crate::error::SkidResult;
use crate::initiator::InitiatorPort;
use crate::target::TargetPort;

/// Builds a crossing and returns its two halves.
///
/// The halves share nothing but the slot ring; each may be moved to the
/// thread or scheduler that drives its domain.
pub fn channel(config: CdcConfig) -> SkidResult<(InitiatorPort, TargetPort)> {
    config.validate()?;
    let (writer, reader) = slot_ring(config.ring_config())?;
    let initiator = InitiatorPort::new(config.clone(), writer);
    let target = TargetPort::new(config, reader);
    Ok((initiator, target))
}
