use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Schedule group ID
    GroupId
);
define_id!(
    /// Schedule ID. Ordering matters: priority ties between matching
    /// schedules are broken by the smallest ID.
    ScheduleId
);
define_id!(
    /// Content item ID
    ContentId
);
define_id!(
    /// Device ID
    DeviceId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_ordering() {
        assert!(ScheduleId::new(1) < ScheduleId::new(2));
        assert_eq!(GroupId::new(7).as_i64(), 7);
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = ContentId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: ContentId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }
}
