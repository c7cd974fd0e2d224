//! Message exchange patterns.
//!
//! Each pattern is described by a static slot table: the labels it may hold,
//! the labels that must be present, and the optional follow-up that keeps
//! the exchange open after them. The operation context consults the table
//! instead of per-pattern overrides.

use super::MessageLabel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot layout for one message exchange pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MepSlots {
    /// Labels a message may be added under (the fault slot is always allowed).
    pub allowed: &'static [MessageLabel],
    /// Labels that must be filled before the exchange can complete.
    pub required: &'static [MessageLabel],
    /// Labels that may follow the required ones. While any are listed the
    /// exchange stays open until one arrives or the exchange is settled.
    pub optional: &'static [MessageLabel],
    /// The label of the first message of the exchange.
    pub initial: MessageLabel,
    /// Whether the end of the receive flow settles an exchange still
    /// waiting on its optional follow-up.
    pub settles_after_receive: bool,
}

const IN: &[MessageLabel] = &[MessageLabel::In];
const OUT: &[MessageLabel] = &[MessageLabel::Out];
const IN_OUT: &[MessageLabel] = &[MessageLabel::In, MessageLabel::Out];
const FAULT: &[MessageLabel] = &[MessageLabel::Fault];
const NONE: &[MessageLabel] = &[];

/// A message exchange pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mep {
    /// One inbound message, no response.
    InOnly,
    /// One inbound message, an optional fault back.
    RobustInOnly,
    /// Request then response (server side).
    #[default]
    InOut,
    /// Request then an optional response.
    InOptionalOut,
    /// One outbound message, no response.
    OutOnly,
    /// One outbound message, an optional fault back.
    RobustOutOnly,
    /// Request then response (client side).
    OutIn,
    /// Outbound request then an optional inbound response.
    OutOptionalIn,
}

impl Mep {
    /// All patterns, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::InOnly,
        Self::RobustInOnly,
        Self::InOut,
        Self::InOptionalOut,
        Self::OutOnly,
        Self::RobustOutOnly,
        Self::OutIn,
        Self::OutOptionalIn,
    ];

    /// Returns the slot table for this pattern.
    #[must_use]
    pub fn slots(self) -> MepSlots {
        match self {
            Self::InOnly => MepSlots {
                allowed: IN,
                required: IN,
                optional: NONE,
                initial: MessageLabel::In,
                settles_after_receive: false,
            },
            Self::RobustInOnly => MepSlots {
                allowed: IN,
                required: IN,
                optional: FAULT,
                initial: MessageLabel::In,
                settles_after_receive: true,
            },
            Self::InOut => MepSlots {
                allowed: IN_OUT,
                required: IN_OUT,
                optional: NONE,
                initial: MessageLabel::In,
                settles_after_receive: false,
            },
            Self::InOptionalOut => MepSlots {
                allowed: IN_OUT,
                required: IN,
                optional: OUT,
                initial: MessageLabel::In,
                settles_after_receive: true,
            },
            Self::OutOnly => MepSlots {
                allowed: OUT,
                required: OUT,
                optional: NONE,
                initial: MessageLabel::Out,
                settles_after_receive: false,
            },
            Self::RobustOutOnly => MepSlots {
                allowed: OUT,
                required: OUT,
                optional: FAULT,
                initial: MessageLabel::Out,
                settles_after_receive: false,
            },
            Self::OutIn => MepSlots {
                allowed: IN_OUT,
                required: IN_OUT,
                optional: NONE,
                initial: MessageLabel::Out,
                settles_after_receive: false,
            },
            Self::OutOptionalIn => MepSlots {
                allowed: IN_OUT,
                required: OUT,
                optional: IN,
                initial: MessageLabel::Out,
                settles_after_receive: false,
            },
        }
    }

    /// The WSDL 2.0 URI of the pattern.
    #[must_use]
    pub fn uri(self) -> &'static str {
        match self {
            Self::InOnly => "http://www.w3.org/ns/wsdl/in-only",
            Self::RobustInOnly => "http://www.w3.org/ns/wsdl/robust-in-only",
            Self::InOut => "http://www.w3.org/ns/wsdl/in-out",
            Self::InOptionalOut => "http://www.w3.org/ns/wsdl/in-opt-out",
            Self::OutOnly => "http://www.w3.org/ns/wsdl/out-only",
            Self::RobustOutOnly => "http://www.w3.org/ns/wsdl/robust-out-only",
            Self::OutIn => "http://www.w3.org/ns/wsdl/out-in",
            Self::OutOptionalIn => "http://www.w3.org/ns/wsdl/out-opt-in",
        }
    }

    /// Looks a pattern up by its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.uri() == uri)
    }

    /// Returns true if the pattern carries messages in both directions.
    #[must_use]
    pub fn is_two_way(self) -> bool {
        self.slots().allowed.len() > 1
    }

    /// Returns true if a message may be added under `label`.
    #[must_use]
    pub fn allows(self, label: MessageLabel) -> bool {
        label == MessageLabel::Fault || self.slots().allowed.contains(&label)
    }

    /// Returns true if an exchange holding `filled` is complete: a fault
    /// arrived, or every required label is present and either nothing
    /// optional is expected or an optional label arrived too.
    #[must_use]
    pub fn is_satisfied_by(self, filled: &[MessageLabel]) -> bool {
        let slots = self.slots();
        filled.contains(&MessageLabel::Fault)
            || (slots.required.iter().all(|l| filled.contains(l))
                && (slots.optional.is_empty() || slots.optional.iter().any(|l| filled.contains(l))))
    }

    /// Returns true if an exchange holding `filled` may be completed without
    /// its optional follow-up.
    #[must_use]
    pub fn can_settle(self, filled: &[MessageLabel]) -> bool {
        self.slots().required.iter().all(|l| filled.contains(l))
    }
}

impl fmt::Display for Mep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}
