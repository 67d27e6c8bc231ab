//! Helper macro for generating driven-port error enums.
//!
//! Every generated enum carries `Connection` and `Query` variants, named after
//! the port, plus any port-specific variants. Each variant gets a snake-case
//! constructor whose fields accept anything convertible into the field type.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($field: impl Into<$ty>),*) -> Self {
                Self::$variant { $($field: $field.into()),* }
            }
        }
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident for $subject:literal {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:literal
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            /// The backing collaborator could not be reached.
            #[error("{subject} connection failed: {message}", subject = $subject)]
            Connection { message: String },
            /// A query or call failed while executing.
            #[error("{subject} query failed: {message}", subject = $subject)]
            Query { message: String },
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            define_port_error!(@ctor Connection { message: String });
            define_port_error!(@ctor Query { message: String });
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*

            /// Whether the failure is a reachability problem rather than a
            /// rejected operation.
            pub fn is_connection(&self) -> bool {
                matches!(self, Self::Connection { .. })
            }
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    define_port_error! {
        pub enum SamplePortError for "sample port" {
            Rejected { reason: String } => "rejected: {reason}",
            Overflow { limit: u32 } => "over {limit}",
            Missing => "missing",
        }
    }

    #[test]
    fn shared_variants_name_the_port() {
        assert_eq!(
            SamplePortError::connection("refused").to_string(),
            "sample port connection failed: refused"
        );
        assert_eq!(
            SamplePortError::query("syntax").to_string(),
            "sample port query failed: syntax"
        );
    }

    #[test]
    fn constructors_convert_fields() {
        assert_eq!(SamplePortError::rejected("nope").to_string(), "rejected: nope");
        assert_eq!(SamplePortError::overflow(7_u32).to_string(), "over 7");
        assert_eq!(SamplePortError::missing().to_string(), "missing");
    }

    #[test]
    fn connection_failures_are_flagged() {
        assert!(SamplePortError::connection("down").is_connection());
        assert!(!SamplePortError::query("bad").is_connection());
    }
}
