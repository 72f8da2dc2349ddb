//! Newtypes for raw Scaleway API values.

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub(crate) struct $name(String);

        impl $name {
            pub(crate) const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

newtype!(
    /// Server UUID as returned by the Instances API.
    ServerId
);
newtype!(
    /// Availability zone such as `fr-par-1`.
    Zone
);
newtype!(
    /// Raw server state string (`running`, `stopped in place`, ...).
    ServerState
);
newtype!(
    /// Action name accepted by the server action endpoint.
    Action
);
