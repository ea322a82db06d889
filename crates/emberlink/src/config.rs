// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Emberlink global configuration - single source of truth.
//!
//! Centralizes stack constants and runtime tunables. Constants below come
//! from the Bluetooth Core and TLS specifications; never hardcode them
//! elsewhere.
//!
//! Two levels:
//!
//! - **Static**: compile-time constants (ATT MTU floor, DLE ceiling, TLS
//!   record limit)
//! - **Dynamic**: [`RuntimeConfig`], swapped atomically and overridable via
//!   `EMBERLINK_*` environment variables at load

use arc_swap::ArcSwap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Minimum ATT MTU for LE (Bluetooth Core 5.4 Vol 3 Part F Sec.3.2.8).
pub const ATT_MTU_DEFAULT: u16 = 23;

/// Largest ATT MTU this host will request or accept.
pub const ATT_MTU_MAX: u16 = 512;

/// ACL payload ceiling with Data Length Extension
/// (Bluetooth Core 5.4 Vol 6 Part B Sec.4.5.10).
pub const DLE_MAX_OCTETS: u16 = 251;

/// Max transmit time matching [`DLE_MAX_OCTETS`], in microseconds.
pub const DLE_MAX_TIME_US: u16 = 2120;

/// ACL payload length before Data Length Extension.
pub const ACL_DEFAULT_OCTETS: u16 = 27;

/// L2CAP basic header length (len + cid).
pub const L2CAP_HEADER_LEN: usize = 4;

/// TLS record plaintext ceiling (RFC 8446 Sec.5.1).
pub const TLS_MAX_FRAGMENT: usize = 16_384;

/// Runtime tunables; read through [`active`], replaced through [`store`].
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Host event queue depth before producers block.
    pub event_queue_depth: usize,
    /// Event pump poll granularity.
    pub pump_poll_ms: u32,
    /// GATT request round-trip budget.
    pub request_timeout: Duration,
    /// ATT MTU requested on MTU exchange.
    pub preferred_mtu: u16,
    /// Request Data Length Extension after connecting.
    pub auto_data_length: bool,
    /// Request the 2M PHY after connecting.
    pub auto_phy_2m: bool,
    /// Per-connection block-ack TX window (in-flight ATT PDUs).
    pub tx_window: u8,
    /// Per-connection block-ack RX window advertised to the peer.
    pub rx_window: u8,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_queue_depth: 64,
            pump_poll_ms: 10,
            request_timeout: Duration::from_secs(5),
            preferred_mtu: ATT_MTU_MAX,
            auto_data_length: true,
            auto_phy_2m: true,
            tx_window: 4,
            rx_window: 4,
        }
    }
}

impl RuntimeConfig {
    /// Default config with `EMBERLINK_*` environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_u64("EMBERLINK_EVENT_QUEUE_DEPTH") {
            cfg.event_queue_depth = v as usize;
        }
        if let Some(v) = env_u64("EMBERLINK_PUMP_POLL_MS") {
            cfg.pump_poll_ms = v as u32;
        }
        if let Some(v) = env_u64("EMBERLINK_REQUEST_TIMEOUT_MS") {
            cfg.request_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("EMBERLINK_PREFERRED_MTU") {
            cfg.preferred_mtu = (v as u16).clamp(ATT_MTU_DEFAULT, ATT_MTU_MAX);
        }
        cfg
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

static ACTIVE: OnceLock<ArcSwap<RuntimeConfig>> = OnceLock::new();

fn cell() -> &'static ArcSwap<RuntimeConfig> {
    ACTIVE.get_or_init(|| ArcSwap::from_pointee(RuntimeConfig::from_env()))
}

/// The active runtime configuration.
#[must_use]
pub fn active() -> Arc<RuntimeConfig> {
    cell().load_full()
}

/// Atomically replace the active configuration.
pub fn store(config: RuntimeConfig) {
    cell().store(Arc::new(config));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_spec_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.preferred_mtu, 512);
        assert_eq!(DLE_MAX_OCTETS, 251);
        assert_eq!(DLE_MAX_TIME_US, 2120);
        assert_eq!(ATT_MTU_DEFAULT, 23);
    }

    #[test]
    fn store_swaps_active_config() {
        let mut cfg = RuntimeConfig::default();
        cfg.tx_window = 8;
        store(cfg);
        assert_eq!(active().tx_window, 8);
        store(RuntimeConfig::default());
    }
}
