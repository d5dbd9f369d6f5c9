//! Macros for defining typed ID types.

/// Macro to define a typed, string-backed ID.
///
/// This generates a newtype wrapper around `String` with:
/// - A `KIND` constant used in error messages and logs
/// - `parse()` with shared validation
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations (validated)
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_id!(PatientId, "patient");
///
/// let id: PatientId = "P-1A2B3C".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $kind:literal) => {
        /// A typed ID for this resource type.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Resource kind, for messages.
            pub const KIND: &'static str = $kind;

            /// Parses an ID from a string.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                $crate::validate(s)?;
                Ok(Self(s.to_string()))
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the ID, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                $crate::validate(&s)?;
                Ok(Self(s))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::try_from(s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}
