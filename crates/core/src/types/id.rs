//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_string_id!` macro to create type-safe ID wrappers that
//! prevent accidentally mixing IDs from different entity types. Account and
//! attempt identifiers are opaque handles assigned by external systems, so
//! the wrappers hold strings rather than integers.

/// Macro to define a type-safe opaque string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use cargaruta_identity_core::define_string_id;
/// define_string_id!(UserId);
/// define_string_id!(AttemptId);
///
/// let user_id = UserId::new("u-123");
/// let attempt_id = AttemptId::new("a-456");
///
/// // These are different types, so this won't compile:
/// // let _: UserId = attempt_id;
/// ```
#[macro_export]
macro_rules! define_string_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying value as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the underlying `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }
    };
}

// Define standard entity IDs
define_string_id!(UserId);
define_string_id!(AttemptId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_types() {
        let user = UserId::new("u-1");
        let attempt = AttemptId::new("u-1");
        assert_eq!(user.as_str(), attempt.as_str());
    }

    #[test]
    fn test_display_and_into_inner() {
        let id = AttemptId::new("attempt-42");
        assert_eq!(id.to_string(), "attempt-42");
        assert_eq!(id.into_inner(), "attempt-42");
    }

    #[test]
    fn test_serde_transparent() {
        let id = UserId::new("u-9");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"u-9\"");
    }
}
