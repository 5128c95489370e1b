//! Flag sets for channel initialization and name info queries.
//!
//! The bit values are those of the classic C resolver libraries so that
//! raw values taken from existing configurations keep their meaning.

use std::{fmt, ops};
use crate::error::Error;


//------------ flag_set! -----------------------------------------------------

/// Creates a flag set type wrapping a `u32`.
///
/// This adds the constants, the bit operators, `Debug` listing the names of
/// the set flags, and a checked constructor from raw bits.
macro_rules! flag_set {
    ( $(#[$attr:meta])* => $flagtype:ident;
      $( $(#[$flag_attr:meta])* ( $flag:ident => $value:expr ) )* ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
        #[cfg_attr(
            feature = "serde",
            derive(serde::Serialize, serde::Deserialize),
            serde(transparent)
        )]
        pub struct $flagtype(u32);

        impl $flagtype {
            $(
                $(#[$flag_attr])*
                pub const $flag: $flagtype = $flagtype($value);
            )*

            /// All flags defined for this type.
            const ALL: u32 = 0 $( | $value )*;

            /// The named flags in definition order.
            const NAMES: &'static [(&'static str, u32)] = &[
                $( (stringify!($flag), $value), )*
            ];

            /// Returns an empty flag set.
            #[must_use]
            pub const fn empty() -> Self {
                $flagtype(0)
            }

            /// Creates a flag set from raw bits.
            ///
            /// Returns [`Error::BadFlags`] if any undefined bit is set.
            pub fn from_bits(bits: u32) -> Result<Self, Error> {
                if bits & !Self::ALL != 0 {
                    Err(Error::BadFlags)
                } else {
                    Ok($flagtype(bits))
                }
            }

            /// Creates a flag set from raw bits without checking them.
            #[must_use]
            pub const fn from_bits_retain(bits: u32) -> Self {
                $flagtype(bits)
            }

            /// Returns the raw bits.
            #[must_use]
            pub const fn bits(self) -> u32 {
                self.0
            }

            /// Returns whether all flags of `other` are set in `self`.
            #[must_use]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns whether any flag of `other` is set in `self`.
            #[must_use]
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// Returns whether bits are set that this type doesn’t define.
            #[must_use]
            pub const fn has_unknown_bits(self) -> bool {
                self.0 & !Self::ALL != 0
            }

            /// Sets the flags of `other`.
            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0
            }

            /// Clears the flags of `other`.
            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0
            }
        }

        impl ops::BitOr for $flagtype {
            type Output = Self;

            fn bitor(self, other: Self) -> Self {
                $flagtype(self.0 | other.0)
            }
        }

        impl ops::BitOrAssign for $flagtype {
            fn bitor_assign(&mut self, other: Self) {
                self.0 |= other.0
            }
        }

        impl ops::BitAnd for $flagtype {
            type Output = Self;

            fn bitand(self, other: Self) -> Self {
                $flagtype(self.0 & other.0)
            }
        }

        impl fmt::Debug for $flagtype {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut first = true;
                f.write_str(concat!(stringify!($flagtype), "("))?;
                for &(name, value) in Self::NAMES {
                    if value != 0 && self.0 & value == value {
                        if !first {
                            f.write_str(" | ")?;
                        }
                        f.write_str(name)?;
                        first = false;
                    }
                }
                let unknown = self.0 & !Self::ALL;
                if unknown != 0 {
                    if !first {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{:#x}", unknown)?;
                }
                f.write_str(")")
            }
        }
    }
}


//------------ InitFlags -----------------------------------------------------

flag_set! {
    /// Flags changing the behaviour of a channel.
    =>
    InitFlags;

    /// Always use TCP.
    (USEVC => 1 << 0)

    /// Only query the first configured server.
    (PRIMARY => 1 << 1)

    /// Use truncated answers instead of retrying over TCP.
    (IGNTC => 1 << 2)

    /// Clear the recursion desired bit in queries.
    (NORECURSE => 1 << 3)

    /// Keep sockets open when no queries are pending.
    (STAYOPEN => 1 << 4)

    /// Don’t apply the search list to names.
    (NOSEARCH => 1 << 5)

    /// Ignore the `HOSTALIASES` environment variable.
    (NOALIASES => 1 << 6)

    /// Accept answers that would otherwise make us try the next server.
    (NOCHECKRESP => 1 << 7)
}


//------------ NameInfoFlags -------------------------------------------------

flag_set! {
    /// Flags for name info queries.
    =>
    NameInfoFlags;

    /// Only return the host part of names in the local domain.
    (NOFQDN => 1 << 0)

    /// Return the numeric form of the address instead of a name.
    (NUMERICHOST => 1 << 1)

    /// Fail if the address has no name.
    (NAMEREQD => 1 << 2)

    /// Return the numeric form of the port instead of a service name.
    (NUMERICSERV => 1 << 3)

    /// Look up services for TCP. This is the default.
    (TCP => 0)

    /// Look up services for UDP.
    (UDP => 1 << 4)

    /// Look up services for SCTP.
    (SCTP => 1 << 5)

    /// Look up services for DCCP.
    (DCCP => 1 << 6)

    /// Return the numeric form of the scope ID.
    (NUMERICSCOPE => 1 << 7)

    /// Look up the host name. Added when an address is given.
    (LOOKUPHOST => 1 << 8)

    /// Look up the service name. Added when a port is given.
    (LOOKUPSERVICE => 1 << 9)
}

impl NameInfoFlags {
    /// Checks that the flags can be used together.
    ///
    /// At most one of the protocol flags may be given, and a numeric host
    /// contradicts requiring a name.
    pub fn check(self) -> Result<Self, Error> {
        if self.has_unknown_bits() {
            return Err(Error::BadFlags);
        }
        let protocols = [Self::UDP, Self::SCTP, Self::DCCP]
            .into_iter()
            .filter(|proto| self.contains(*proto))
            .count();
        if protocols > 1 {
            return Err(Error::BadFlags);
        }
        if self.contains(Self::NUMERICHOST | Self::NAMEREQD) {
            return Err(Error::BadFlags);
        }
        Ok(self)
    }

    /// Returns the protocol name to look up services for.
    pub fn service_protocol(self) -> &'static str {
        if self.contains(Self::UDP) {
            "udp"
        } else if self.contains(Self::SCTP) {
            "sctp"
        } else if self.contains(Self::DCCP) {
            "dccp"
        } else {
            "tcp"
        }
    }
}


//============ Testing =======================================================
