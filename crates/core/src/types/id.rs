//! Newtype IDs for backend entity references.
//!
//! The backend exposes numeric (`Long`) identifiers for every resource. The
//! `define_id!` macro wraps them so a product id can never be passed where an
//! address id is expected.

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_i64()`
/// - `From<i64>` and `Into<i64>` implementations
/// - `Display` and `FromStr` for use in URL path segments
///
/// # Example
///
/// ```rust
/// # use kiln_core::define_id;
/// define_id!(ShelfId);
/// define_id!(KilnId);
///
/// let shelf = ShelfId::new(7);
/// assert_eq!(shelf.to_string(), "7");
/// assert_eq!("7".parse::<ShelfId>().unwrap(), shelf);
///
/// // These are different types, so this won't compile:
/// // let _: KilnId = shelf;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Backend resources
define_id!(UserId);
define_id!(ProductId);
define_id!(CategoryId);
define_id!(AddressId);
define_id!(OrderId);
define_id!(OrderItemId);
