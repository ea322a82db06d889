// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Capability system: compile-time structural typing for driver and
//! protocol composition.
//!
//! A *capability* is a named bundle of required operations and constants,
//! declared as a Rust trait (e.g. [`crate::hci::HciTransport`],
//! [`crate::crypto::CryptoProvider`]). A *spec* names a concrete
//! implementation plus its stable metadata. `Cap::from(spec)` validates the
//! implementation against the capability contract **at compile time** - a
//! missing or mistyped member fails the trait bound at the `from` call site
//! with a diagnostic naming the offending trait - and produces a wrapper
//! carrying the implementation, its exported constants and a propagated
//! [`Meta`] record.
//!
//! Implementations are chosen once at compile time; every downstream type is
//! monomorphic over the chosen implementation. No vtables, no `Any`.
//!
//! # Example
//!
//! ```
//! use emberlink::cap::{Cap, Meta, Spec};
//! use emberlink::hci::{Hci, LoopbackController};
//!
//! let (port, _peer) = LoopbackController::pair();
//! let hci = Hci::from(Spec::new(port, Meta::new("loopback-hci")));
//! assert_eq!(hci.meta().id(), "loopback-hci");
//! assert!(emberlink::cap::is(&hci));
//! ```

use core::marker::PhantomData;

/// Derived-fact flags recorded in [`Meta`] during validation.
///
/// Higher layers pattern-match on facts for logging and feature gating
/// (e.g. the SNTP client checks [`facts::HAS_SOURCE_ADDR`] before enabling
/// source-IP validation).
pub mod facts {
    /// Implementation exposes a gyroscope alongside the accelerometer.
    pub const HAS_GYROSCOPE: u32 = 1 << 0;
    /// GATT surface supports indications (not just notifications).
    pub const SUPPORTS_INDICATE: u32 = 1 << 1;
    /// Datagram socket reports the source address of received packets.
    pub const HAS_SOURCE_ADDR: u32 = 1 << 2;
    /// Crypto provider carries the optional signature-verification set.
    pub const HAS_SIGNATURES: u32 = 1 << 3;
    /// Crypto provider carries the TLS 1.2 legacy set (SHA-1, P-256).
    pub const HAS_TLS12_LEGACY: u32 = 1 << 4;
    /// Transport performs its own packet framing.
    pub const FRAMED_TRANSPORT: u32 = 1 << 5;
}

/// Stable metadata carried by every capability wrapper.
///
/// The identifier comes from the spec; fact flags are added by the
/// capability's [`Contract::derive`] during validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Meta {
    id: &'static str,
    facts: u32,
}

impl Meta {
    /// Create metadata with a stable identifier and no facts.
    #[must_use]
    pub const fn new(id: &'static str) -> Self {
        Self { id, facts: 0 }
    }

    /// Stable identifier (the spec's `meta.id`).
    #[must_use]
    pub const fn id(&self) -> &'static str {
        self.id
    }

    /// Record a derived fact (see [`facts`]).
    #[must_use]
    pub const fn with_fact(mut self, fact: u32) -> Self {
        self.facts |= fact;
        self
    }

    /// True iff every bit of `fact` was recorded.
    #[must_use]
    pub const fn has(&self, fact: u32) -> bool {
        self.facts & fact == fact
    }
}

/// Compile-time record naming a concrete implementation plus its metadata.
///
/// Specs are the sole input to [`Cap::from`].
pub struct Spec<T> {
    /// The candidate implementation.
    pub imp: T,
    /// Stable metadata (mandatory `id`, optional pre-set facts).
    pub meta: Meta,
}

impl<T> Spec<T> {
    /// Bundle an implementation with its metadata.
    #[must_use]
    pub const fn new(imp: T, meta: Meta) -> Self {
        Self { imp, meta }
    }
}

/// Per-capability validation hook.
///
/// A capability declares a zero-sized marker type (e.g. `HciCap`) and
/// implements `Contract<T>` for every `T` satisfying the capability trait:
///
/// ```ignore
/// pub struct HciCap;
/// impl<T: HciTransport> Contract<T> for HciCap {
///     type Config = HciConfig;
/// }
/// ```
///
/// The blanket bound is the structural check: `Cap::<HciCap, T>::from`
/// compiles iff `T: HciTransport`, and the compiler diagnostic names the
/// unsatisfied capability trait.
pub trait Contract<T> {
    /// Capability configuration: which optional members are required.
    type Config: Default;

    /// Record facts derived from the implementation into the wrapper meta.
    ///
    /// The default keeps the spec's meta unchanged.
    fn derive(imp: &T, meta: Meta, config: &Self::Config) -> Meta {
        let _ = (imp, config);
        meta
    }
}

/// The wrapper produced by `Cap::from(spec)`.
///
/// Carries the validated implementation, the propagated [`Meta`] and the
/// capability's operations (forwarded by each capability's extension impl).
pub struct Cap<C: Contract<T>, T> {
    imp: T,
    meta: Meta,
    _cap: PhantomData<C>,
}

impl<C: Contract<T>, T> Cap<C, T> {
    /// Validate `spec` against capability `C` with the default config.
    ///
    /// Fails at compile time (unsatisfied `Contract` bound) if the
    /// implementation is missing a required member.
    #[must_use]
    pub fn from(spec: Spec<T>) -> Self {
        Self::from_with(spec, C::Config::default())
    }

    /// Validate with an explicit config relaxing or extending the
    /// capability's optional member set.
    #[must_use]
    pub fn from_with(spec: Spec<T>, config: C::Config) -> Self {
        let meta = C::derive(&spec.imp, spec.meta, &config);
        Self {
            imp: spec.imp,
            meta,
            _cap: PhantomData,
        }
    }

    /// The propagated metadata record.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Borrow the validated implementation.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.imp
    }

    /// Mutably borrow the validated implementation.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.imp
    }

    /// Unwrap into the implementation, discarding the metadata.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.imp
    }
}

mod sealed {
    pub trait Sealed {}
    impl<C: super::Contract<T>, T> Sealed for super::Cap<C, T> {}
}

/// Marker implemented only by [`Cap`] wrappers.
///
/// `is(&value)` therefore only accepts values proven to have passed through
/// some capability's `from`; the negative case is a compile failure rather
/// than a runtime `false`.
pub trait Wrapped: sealed::Sealed {}

impl<C: Contract<T>, T> Wrapped for Cap<C, T> {}

/// True for any value produced by a capability's `from`.
#[must_use]
pub fn is<W: Wrapped>(_wrapper: &W) -> bool {
    true
}
