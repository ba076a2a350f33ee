//! Integer identifiers shared by the wire protocol and the stores.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw integer value.
            pub fn get(self) -> i64 {
                self.0
            }

            /// Database serial ids start at 1; zero and negatives are never issued.
            pub fn is_valid(self) -> bool {
                self.0 > 0
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id!(
    /// A registered user.
    UserId
);
int_id!(
    /// A chama (savings group); only its membership matters for chat fan-out.
    GroupId
);
int_id!(
    /// A persisted chat message.
    MessageId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_positive_ids_are_valid() {
        assert!(UserId(1).is_valid());
        assert!(!UserId(0).is_valid());
        assert!(!GroupId(-4).is_valid());
    }

    #[test]
    fn serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&UserId(7)).unwrap(), "7");
        let g: GroupId = serde_json::from_str("12").unwrap();
        assert_eq!(g, GroupId(12));
    }
}
