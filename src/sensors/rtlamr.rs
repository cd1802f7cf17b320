//! Utility meter reader backed by `rtlamr`
//!
//! Binding the sensor starts an `rtlamr` process and a task that publishes
//! every consumption message it decodes. The timer event does nothing;
//! readings arrive whenever the meter transmits. The process is stopped when
//! the sensor is dropped.

use crate::scheduler::LoopHandle;
use crate::sensor::args::{ArgSchema, ArgSpec, ArgType, TypedArgs};
use crate::sensor::{Sensor, SensorBase, SensorDescriptor, SensorError};
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const RTLAMR_PROGRAM: &str = "rtlamr";

const ARGS: ArgSchema = &[
    ArgSpec::new("meter_id", ArgType::Int),
    ArgSpec::new("symbol_length", ArgType::Int),
];

#[derive(Debug, Deserialize)]
struct Packet {
    #[serde(rename = "Message")]
    message: Option<MeterMessage>,
}

#[derive(Debug, Deserialize)]
struct MeterMessage {
    #[serde(rename = "ID")]
    id: Option<u64>,
    #[serde(rename = "Consumption")]
    consumption: Option<u64>,
}

/// A running meter decoder process and the task relaying its output
#[derive(Debug)]
pub struct MeterDriver {
    child: Child,
    relay: JoinHandle<()>,
}

impl MeterDriver {
    /// Start `program` and publish a reading under `{prefix}/{name}` for
    /// every line it prints that decodes as one.
    ///
    /// Needs a Tokio runtime; outside one this fails with
    /// [`SensorError::Spawn`].
    pub fn spawn(
        program: &str,
        args: &[String],
        handle: LoopHandle,
        name: &str,
    ) -> Result<Self, SensorError> {
        Handle::try_current().map_err(|e| SensorError::Spawn(format!("{program}: {e}")))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SensorError::Spawn(format!("{program}: {e}")))?;

        let Some(stdout) = child.stdout.take() else {
            return Err(SensorError::Spawn(format!("{program}: stdout not captured")));
        };

        let name = name.to_string();
        info!(sensor = %name, pid = ?child.id(), "Started {}", program);
        let relay = tokio::spawn(async move {
            let published = relay_readings(stdout, &handle, &name).await;
            warn!(sensor = %name, published, "Meter decoder output ended");
        });

        Ok(Self { child, relay })
    }

    /// Whether readings may still arrive
    pub fn is_running(&self) -> bool {
        !self.relay.is_finished()
    }

    /// OS process id, while the process has not been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

impl Drop for MeterDriver {
    fn drop(&mut self) {
        self.relay.abort();
        if let Err(e) = self.child.start_kill() {
            debug!("Meter decoder already stopped: {}", e);
        }
    }
}

pub struct RtlAmrSensor {
    base: SensorBase,
    meter_id: i64,
    symbol_length: i64,
    driver: Option<MeterDriver>,
}

impl RtlAmrSensor {
    pub fn new(base: SensorBase, meter_id: i64, symbol_length: i64) -> Self {
        Self {
            base,
            meter_id,
            symbol_length,
            driver: None,
        }
    }

    pub fn construct(args: &TypedArgs) -> Result<Box<dyn Sensor>, SensorError> {
        let base = SensorBase::from_args(args)?;
        let meter_id = args.int("meter_id").unwrap_or(0);
        let symbol_length = args.int("symbol_length").unwrap_or(0);
        Ok(Box::new(Self::new(base, meter_id, symbol_length)))
    }

    pub fn descriptor() -> SensorDescriptor {
        SensorDescriptor::derived(ARGS, Self::construct)
    }

    /// Command-line arguments for the `rtlamr` process
    pub fn command_args(&self) -> Vec<String> {
        command_args(self.meter_id, self.symbol_length)
    }
}

impl Sensor for RtlAmrSensor {
    fn base(&self) -> &SensorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SensorBase {
        &mut self.base
    }

    fn on_bind(&mut self) -> Result<(), SensorError> {
        let handle = self.base.loop_handle()?.clone();
        let driver =
            MeterDriver::spawn(RTLAMR_PROGRAM, &self.command_args(), handle, &self.base.name)?;
        self.driver = Some(driver);
        Ok(())
    }

    fn fire(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn keeps_alive(&self) -> bool {
        self.driver.as_ref().is_some_and(MeterDriver::is_running)
    }
}

/// Build the `rtlamr` argument list; zero leaves an option out
pub fn command_args(meter_id: i64, symbol_length: i64) -> Vec<String> {
    let mut args: Vec<String> = ["-unique", "-format", "json"]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
    if meter_id != 0 {
        args.push("-filterid".to_string());
        args.push(meter_id.to_string());
    }
    if symbol_length != 0 {
        args.push("-symbollength".to_string());
        args.push(symbol_length.to_string());
    }
    args
}

/// Turn one line of `rtlamr` JSON output into a reading payload.
///
/// Lines that are not JSON, or messages missing the meter ID or the
/// consumption, yield `None`.
pub fn parse_reading(line: &str) -> Option<String> {
    let packet: Packet = serde_json::from_str(line).ok()?;
    let message = packet.message?;
    let id = message.id?;
    let consumption = message.consumption?;
    Some(serde_json::json!({ "id": id, "kWh": consumption }).to_string())
}

/// Publish a reading for every decodable line until the stream ends
pub async fn relay_readings<R: AsyncRead + Unpin>(
    source: R,
    handle: &LoopHandle,
    name: &str,
) -> usize {
    let mut lines = BufReader::new(source).lines();
    let mut published = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(sensor = %name, error = %e, "Failed to read meter output");
                break;
            }
        };
        match parse_reading(&line) {
            Some(payload) => {
                handle.publish(name, payload);
                published += 1;
            }
            None => debug!(sensor = %name, "Skipping meter line: {}", line),
        }
    }
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const READING: &str = r#"{"Message":{"ID":7,"Consumption":100}}"#;

    async fn wait_until_stopped(driver: &MeterDriver) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while driver.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("relay should finish when the process exits");
    }

    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !matches!(stat.split_whitespace().nth(2), Some("Z" | "X")),
            Err(_) => false,
        }
    }

    #[test]
    fn test_command_args_minimal() {
        assert_eq!(command_args(0, 0), vec!["-unique", "-format", "json"]);
    }

    #[test]
    fn test_command_args_with_filters() {
        assert_eq!(
            command_args(12345678, 72),
            vec![
                "-unique",
                "-format",
                "json",
                "-filterid",
                "12345678",
                "-symbollength",
                "72"
            ]
        );
    }

    #[test]
    fn test_parse_reading() {
        let line = r#"{"Time":"2024-01-01T00:00:00Z","Type":"SCM","Message":{"ID":31415926,"Type":7,"TamperPhy":0,"TamperEnc":0,"Consumption":12345,"ChecksumVal":1}}"#;
        assert_eq!(
            parse_reading(line).as_deref(),
            Some(r#"{"id":31415926,"kWh":12345}"#)
        );
    }

    #[test]
    fn test_parse_reading_requires_both_fields() {
        assert_eq!(parse_reading(r#"{"Message":{"ID":1}}"#), None);
        assert_eq!(parse_reading(r#"{"Message":{"Consumption":5}}"#), None);
        assert_eq!(parse_reading(r#"{"Time":"x"}"#), None);
        assert_eq!(parse_reading("not json"), None);
    }

    #[tokio::test]
    async fn test_relay_readings_publishes_valid_lines() {
        let output = concat!(
            r#"{"Message":{"ID":7,"Consumption":100}}"#,
            "\n",
            "garbage\n",
            r#"{"Message":{"ID":7,"Consumption":101}}"#,
            "\n"
        );
        let (handle, mut rx) = LoopHandle::channel("node");

        let published = relay_readings(output.as_bytes(), &handle, "meter").await;

        assert_eq!(published, 2);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.topic, "node/meter");
        assert_eq!(first.payload, br#"{"id":7,"kWh":100}"#.to_vec());
        assert_eq!(
            rx.try_recv().unwrap().payload,
            br#"{"id":7,"kWh":101}"#.to_vec()
        );
    }

    #[test]
    fn test_fire_is_noop() {
        let base = SensorBase::new("meter", 0.0, 0.0).unwrap();
        let mut sensor = RtlAmrSensor::new(base, 0, 0);
        assert!(sensor.fire().is_ok());
        assert!(!sensor.keeps_alive());
    }

    #[test]
    fn test_spawn_needs_runtime() {
        let (handle, _rx) = LoopHandle::channel("node");
        let result = MeterDriver::spawn("true", &[], handle, "meter");
        assert!(matches!(result, Err(SensorError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let (handle, _rx) = LoopHandle::channel("node");
        let result = MeterDriver::spawn("hasensor-no-such-decoder", &[], handle, "meter");
        assert!(matches!(result, Err(SensorError::Spawn(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_driver_relays_process_output() {
        let (handle, mut rx) = LoopHandle::channel("node");
        let script = format!("echo '{READING}'; echo noise");
        let driver =
            MeterDriver::spawn("sh", &["-c".to_string(), script], handle, "meter").unwrap();

        wait_until_stopped(&driver).await;

        let message = rx.try_recv().unwrap();
        assert_eq!(message.topic, "node/meter");
        assert_eq!(message.payload, br#"{"id":7,"kWh":100}"#.to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_driver_stops_process() {
        let (handle, _rx) = LoopHandle::channel("node");
        let driver = MeterDriver::spawn("sleep", &["37".to_string()], handle, "meter").unwrap();
        let pid = driver.id().unwrap();
        assert!(driver.is_running());
        assert!(process_alive(pid));

        drop(driver);

        let stopped = tokio::time::timeout(Duration::from_secs(5), async {
            while process_alive(pid) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(stopped.is_ok(), "decoder process {pid} survived its driver");
    }
}
