//! Text-backed enum types.
//!
//! Every workflow enumeration in the schema is stored as a lowercase
//! snake_case `VARCHAR`. `text_enum!` generates the enum together with its
//! string form, serde and OpenAPI representations, and the Diesel
//! `ToSql`/`FromSql` impls so storage structs can hold the typed value
//! directly.

#[macro_export]
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
            utoipa::ToSchema,
            diesel::AsExpression,
            diesel::FromSqlRow,
        )]
        #[diesel(sql_type = diesel::sql_types::Text)]
        $vis enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!(concat!("Unknown ", stringify!($name), ": {}"), s)),
                }
            }
        }

        impl diesel::serialize::ToSql<diesel::sql_types::Text, diesel::pg::Pg> for $name {
            fn to_sql<'b>(
                &'b self,
                out: &mut diesel::serialize::Output<'b, '_, diesel::pg::Pg>,
            ) -> diesel::serialize::Result {
                use std::io::Write;
                out.write_all(self.as_str().as_bytes())?;
                Ok(diesel::serialize::IsNull::No)
            }
        }

        impl diesel::deserialize::FromSql<diesel::sql_types::Text, diesel::pg::Pg> for $name {
            fn from_sql(bytes: diesel::pg::PgValue<'_>) -> diesel::deserialize::Result<Self> {
                let value = <String as diesel::deserialize::FromSql<
                    diesel::sql_types::Text,
                    diesel::pg::Pg,
                >>::from_sql(bytes)?;
                value.parse::<$name>().map_err(Into::into)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    crate::text_enum! {
        enum Sample {
            First => "first",
            SecondValue => "second_value",
        }
    }

    #[test]
    fn test_text_enum_round_trips_through_str() {
        for value in Sample::ALL {
            assert_eq!(value.as_str().parse::<Sample>(), Ok(*value));
        }
        assert_eq!(Sample::SecondValue.to_string(), "second_value");
    }

    #[test]
    fn test_text_enum_rejects_unknown() {
        let err = "third".parse::<Sample>().unwrap_err();
        assert_eq!(err, "Unknown Sample: third");
    }

    #[test]
    fn test_text_enum_serde_uses_text() {
        let json = serde_json::to_string(&Sample::SecondValue).unwrap();
        assert_eq!(json, "\"second_value\"");
        let back: Sample = serde_json::from_str("\"first\"").unwrap();
        assert_eq!(back, Sample::First);
    }
}
