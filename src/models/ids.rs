use serde::{Deserialize, Serialize};

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }
    };
}

int_id!(
    /// Role identifier, as stored in permission rules and carried on identities.
    RoleId
);
int_id!(
    /// License tier identifier.
    LicenseTierId
);
int_id!(
    /// Compliance standard that can be attached to an application.
    StandardId
);
int_id!(
    /// Assessment template.
    TemplateId
);
