//! Shared test utilities for the engine integration tests.
//!
//! This module provides common test infrastructure including:
//! - A harness wiring a `CommEngine` to a mock comm server
//! - Builders for portable and native settings
//! - JSON assertion helpers

#![allow(dead_code)]

use comm_port_engine::device::{MockCommServer, MockDeviceHandle};
use comm_port_engine::engine::{CommEngine, OpenMode, PortEngine, PortOptions};
use comm_port_engine::rates::RateToken;
use comm_port_engine::settings::{
    DataBits, FlowControl, NativeSettings, Parity, PortConfiguration, StopBits,
};
use serde_json::Value;

pub const PORT: &str = "COMM::0";

/// Native settings as a device might report them before the engine touches it.
pub fn native_at(rate: RateToken) -> NativeSettings {
    NativeSettings {
        rate,
        ..NativeSettings::default()
    }
}

/// Test harness: one mock subsystem, one device, one engine.
pub struct TestHarness {
    pub server: MockCommServer,
    pub device: MockDeviceHandle,
    pub engine: CommEngine,
}

impl TestHarness {
    /// A closed engine over a device at `location` with the given settings.
    pub fn new(location: &str, settings: NativeSettings) -> Self {
        Self::with_options(location, settings, PortOptions::default())
    }

    pub fn with_options(location: &str, settings: NativeSettings, options: PortOptions) -> Self {
        let server = MockCommServer::new();
        let device = server.add_device(location, settings);
        let engine = CommEngine::with_mock(&server, options);
        Self {
            server,
            device,
            engine,
        }
    }

    /// A harness whose engine already holds the default port open.
    pub fn opened() -> Self {
        let mut harness = Self::new(PORT, NativeSettings::default());
        harness
            .engine
            .open(PORT, OpenMode::ReadWrite)
            .expect("Failed to open mock port");
        harness
    }

    /// A second engine sharing this harness's subsystem.
    pub fn second_engine(&self) -> CommEngine {
        CommEngine::with_mock(&self.server, PortOptions::default())
    }
}

/// Builder for portable port configurations.
pub struct PortConfigBuilder {
    config: PortConfiguration,
}

impl PortConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PortConfiguration::default(),
        }
    }

    pub fn rate(mut self, rate: u32) -> Self {
        self.config.input_rate = rate;
        self.config.output_rate = rate;
        self
    }

    pub fn data_bits(mut self, bits: DataBits) -> Self {
        self.config.data_bits = bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.config.parity = parity;
        self
    }

    pub fn stop_bits(mut self, bits: StopBits) -> Self {
        self.config.stop_bits = bits;
        self
    }

    pub fn flow_control(mut self, flow: FlowControl) -> Self {
        self.config.flow_control = flow;
        self
    }

    pub fn build(self) -> PortConfiguration {
        self.config
    }
}

impl Default for PortConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert that a JSON value contains specific fields with expected values.
///
/// # Example
/// ```ignore
/// let actual = json!({"rate": 9600, "parity": "none"});
/// let expected = json!({"rate": 9600});
/// assert_json_contains(&actual, &expected); // Passes - actual contains all of expected
/// ```
pub fn assert_json_contains(actual: &Value, expected: &Value) {
    match (actual, expected) {
        (Value::Object(actual_map), Value::Object(expected_map)) => {
            for (key, expected_value) in expected_map {
                let actual_value = actual_map
                    .get(key)
                    .unwrap_or_else(|| panic!("Expected key '{}' not found in actual JSON", key));
                assert_json_contains(actual_value, expected_value);
            }
        }
        (Value::Array(actual_arr), Value::Array(expected_arr)) => {
            assert_eq!(actual_arr.len(), expected_arr.len(), "Array lengths differ");
            for (actual_item, expected_item) in actual_arr.iter().zip(expected_arr.iter()) {
                assert_json_contains(actual_item, expected_item);
            }
        }
        _ => {
            assert_eq!(
                actual, expected,
                "JSON values differ: expected {:?}, got {:?}",
                expected, actual
            );
        }
    }
}
