//! Opaque identifiers for maps and layers.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Returns a new random identifier.
///
/// Ids are version 4 UUIDs in the simple (32 hex digits) form, so they are safe to use as keys on
/// the remote side without escaping.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a new random id.
            pub fn generate() -> Self {
                Self(new_id())
            }

            /// String representation of the id.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Identifier of a [`Map`](crate::Map).
    MapId
);

opaque_id!(
    /// Identifier of a [`Layer`](crate::layer::Layer).
    LayerId
);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| new_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = LayerId::from("a1");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("a1"));
        assert_eq!(MapId::generate().as_str().len(), 32);
    }
}
