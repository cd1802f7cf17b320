//! Node assembly
//!
//! Turns a [`NodeConfig`] into a populated run loop: the discovery
//! announcement when the node is discoverable, then one event per configured
//! sensor. Any bad sensor description aborts start-up before the loop runs.
//! [`drive`] then runs the loop for as long as the node has work.

use crate::config::NodeConfig;
use crate::discovery::discovery_event;
use crate::error::NodeResult;
use crate::scheduler::{Clock, Scheduler, SchedulerError};
use crate::sensor::{SensorHandle, SensorRegistry};
use crate::transport::Broker;
use tracing::info;

/// Schedule discovery and every configured sensor on `scheduler`.
///
/// Returns the created sensors in configuration order.
pub fn populate<B: Broker, C: Clock>(
    config: &NodeConfig,
    registry: &SensorRegistry,
    scheduler: &mut Scheduler<B, C>,
) -> NodeResult<Vec<SensorHandle>> {
    if config.discoverable {
        info!(
            node = %config.discovery_node,
            interval = config.discovery_interval,
            "Discovery enabled"
        );
        scheduler.schedule(discovery_event(config, scheduler.handle())?);
    }

    let mut sensors = Vec::with_capacity(config.sensors.len());
    for description in &config.sensors {
        let sensor = registry.create_sensor(description)?;
        sensor.set_loop(scheduler.handle())?;
        scheduler.schedule(sensor.event()?);
        info!(
            sensor = %sensor.name(),
            period = sensor.period(),
            "Sensor scheduled from {:?}",
            description
        );
        sensors.push(sensor);
    }

    Ok(sensors)
}

/// Run the loop until its queue drains, then keep servicing the broker while
/// any sensor still has background work publishing through the loop.
pub async fn drive<B: Broker, C: Clock>(
    scheduler: &mut Scheduler<B, C>,
    sensors: &[SensorHandle],
) -> Result<(), SchedulerError> {
    scheduler.run().await?;

    if sensors.iter().any(SensorHandle::keeps_alive) {
        info!("Event queue drained; serving background sensors");
        while sensors.iter().any(SensorHandle::keeps_alive) {
            scheduler.service_idle().await?;
        }
        info!("Background sensors finished");
    }
    Ok(())
}
