//! Fixed-domain enums with integer and string codes.
//!
//! Integer codes are what the store persists; string codes are what goes over
//! the wire. Decoding either form outside the domain is an
//! [`Error::InvalidDomainValue`](crate::Error::InvalidDomainValue).

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident in $domain:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = ($code:literal, $text:literal)
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every value in the domain, in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Integer code as persisted by the store.
            pub const fn code(self) -> i32 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            /// Lowercase string code used in JSON.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn from_code(code: i32) -> $crate::Result<Self> {
                match code {
                    $($code => Ok($name::$variant),)+
                    _ => Err($crate::Error::InvalidDomainValue {
                        domain: $domain,
                        value: code.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<i32> for $name {
            type Error = $crate::Error;

            fn try_from(code: i32) -> $crate::Result<Self> {
                Self::from_code(code)
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> Self {
                value.code()
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::Error;

            fn from_str(s: &str) -> $crate::Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::Error::InvalidDomainValue {
                        domain: $domain,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let text = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                text.parse().map_err(::serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use coded_enum;
