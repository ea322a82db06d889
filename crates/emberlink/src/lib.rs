// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! # Emberlink - Embedded Application Framework
//!
//! Reusable libraries for ESP32-class microcontrollers (single and dual-core
//! Xtensa / RISC-V), built around a compile-time-validated capability system:
//! drivers, protocol stacks and platform services compose through structural
//! contracts instead of runtime polymorphism.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use emberlink::cap::{Meta, Spec};
//! use emberlink::hci::{Hci, LoopbackController};
//! use emberlink::host::{Host, HostConfig};
//!
//! fn main() -> emberlink::host::Result<()> {
//!     let (port, _peer) = LoopbackController::pair();
//!     let hci = Hci::from(Spec::new(port, Meta::new("loopback-hci")));
//!     let host = Host::start(hci, HostConfig::default())?;
//!     host.start_scan()?;
//!     loop {
//!         let event = host.next_event();
//!         println!("{event:?}");
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Layer                           |
//! |        Host events | GATT handlers | TLS byte streams              |
//! +--------------------------------------------------------------------+
//! |                        Protocol Layer                              |
//! |   BLE host (GAP/L2CAP/ATT/GATT) | TLS client (records/handshake)   |
//! +--------------------------------------------------------------------+
//! |                       Capability Layer                             |
//! |   cap::Cap wrappers: HCI transport | crypto suite | sockets | rt   |
//! +--------------------------------------------------------------------+
//! |                        Platform Layer                              |
//! |   UART/SDIO HCI drivers | socket2 sockets | std threads            |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`cap::Cap`] | Capability wrapper produced by `Cap::from(spec)` |
//! | [`host::Host`] | BLE host: GAP + GATT over an HCI transport |
//! | [`tls::TlsClient`] | TLS 1.2/1.3 client over a transport capability |
//! | [`rt::WaitGroup`] | Task-joining helper over an injected runtime |
//! | [`crypto::RingProvider`] | Default crypto capability implementation |
//!
//! ## Modules Overview
//!
//! - [`cap`] - Capability system (start here)
//! - [`host`] - BLE host stack
//! - [`tls`] - TLS 1.2/1.3 client core
//! - [`rt`] - Runtime primitives (mutex, semaphore, events, WaitGroup)
//! - [`net`] - Transport and socket capabilities
//!
//! ## See Also
//!
//! - [Bluetooth Core Specification 5.4](https://www.bluetooth.com/specifications/specs/core-specification-5-4/)
//! - [RFC 8446 - TLS 1.3](https://www.rfc-editor.org/rfc/rfc8446)
//! - [RFC 5246 - TLS 1.2](https://www.rfc-editor.org/rfc/rfc5246)

/// Capability system: compile-time structural contracts and wrappers.
pub mod cap;
/// Global runtime configuration (tunables, env overrides).
pub mod config;
/// Crypto capability: hashes, MACs, KDFs, AEADs, key exchange, signatures.
pub mod crypto;
/// HCI packet codec, transport capability and loopback controller.
pub mod hci;
/// BLE host: GAP, L2CAP, ATT, GATT, flow control, event pump.
pub mod host;
/// Logging outputs and `log` facade bridge.
pub mod logging;
/// Transport and socket capabilities over `socket2`.
pub mod net;
/// Runtime primitives generic over an injected runtime.
pub mod rt;
/// SNTP client (RFC 5905) with origin and source validation.
pub mod sntp;
/// TLS 1.2/1.3 client core.
pub mod tls;

pub use cap::{Cap, Meta, Spec};
