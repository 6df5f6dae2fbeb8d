//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Default timeout of a single read from the connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Default overall deadline of one call.
pub const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(5);
/// Default size of one read from the connection.
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Connection and timing parameters for an [`RpcClient`](crate::RpcClient).
///
/// Durations are written as milliseconds when serialized:
///
/// ```yaml
/// port: /dev/ttySTM0
/// baud_rate: 115200
/// read_timeout_ms: 100
/// call_deadline_ms: 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Serial port name (e.g. `/dev/ttyACM0`, `COM3`).
    pub port: String,

    /// Baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Upper bound on one blocking read. An empty read is not an error; the
    /// call loop keeps polling until its deadline.
    #[serde(
        rename = "read_timeout_ms",
        with = "duration_ms",
        default = "default_read_timeout"
    )]
    pub read_timeout: Duration,

    /// Time a call waits for its response before giving up.
    #[serde(
        rename = "call_deadline_ms",
        with = "duration_ms",
        default = "default_call_deadline"
    )]
    pub call_deadline: Duration,

    /// Bytes requested per read.
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,

    /// Largest envelope the decoder waits for before treating the partial
    /// frame as garbage.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

impl ClientConfig {
    /// Create a config for `port` with default settings.
    pub fn new(port: impl Into<String>) -> Self {
        ClientConfig {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            call_deadline: DEFAULT_CALL_DEADLINE,
            read_chunk: DEFAULT_READ_CHUNK,
            max_frame_len: rpclite_codec::DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = deadline;
        self
    }

    pub fn with_read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes;
        self
    }

    pub fn with_max_frame_len(mut self, bytes: usize) -> Self {
        self.max_frame_len = bytes;
        self
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_call_deadline() -> Duration {
    DEFAULT_CALL_DEADLINE
}

fn default_read_chunk() -> usize {
    DEFAULT_READ_CHUNK
}

fn default_max_frame_len() -> usize {
    rpclite_codec::DEFAULT_MAX_FRAME_LEN
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("/dev/ttySTM0");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.read_timeout, Duration::from_millis(100));
        assert_eq!(config.call_deadline, Duration::from_secs(5));
        assert_eq!(config.read_chunk, 1024);
    }

    #[test]
    fn test_yaml_with_defaults() {
        let config: ClientConfig = serde_yaml::from_str("port: /dev/ttyACM0\nbaud_rate: 9600\n")
            .expect("config should parse");
        assert_eq!(
            config,
            ClientConfig::new("/dev/ttyACM0").with_baud_rate(9600)
        );
    }

    #[test]
    fn test_yaml_durations_in_millis() {
        let yaml = "port: COM3\nread_timeout_ms: 20\ncall_deadline_ms: 1500\n";
        let config: ClientConfig = serde_yaml::from_str(yaml).expect("config should parse");
        assert_eq!(config.read_timeout, Duration::from_millis(20));
        assert_eq!(config.call_deadline, Duration::from_millis(1500));

        let back = serde_yaml::to_string(&config).expect("config should serialize");
        assert!(back.contains("call_deadline_ms: 1500"));
    }
}
