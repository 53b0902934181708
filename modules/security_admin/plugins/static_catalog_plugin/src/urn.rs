//! URN layout used by the static catalog.
//!
//! ```text
//! Server
//! Server/Login[@Name='L1']
//! Server/Database[@Name='sales']
//! Server/Database[@Name='sales']/Table[@Name='t1' and @Schema='dbo']
//! Server/Database[@Name='sales']/Table[@Name='t1' and @Schema='dbo']/Column[@Name='c1']
//! ```

use security_admin_sdk::SecurableType;

pub const SERVER: &str = "Server";

fn element(securable_type: SecurableType) -> String {
    securable_type
        .display_name()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

#[must_use]
pub fn database(name: &str) -> String {
    format!("{SERVER}/Database[@Name='{name}']")
}

/// URN of a server-scoped object other than the server itself.
#[must_use]
pub fn server_object(securable_type: SecurableType, name: &str) -> String {
    format!("{SERVER}/{}[@Name='{name}']", element(securable_type))
}

/// URN of an object inside `database`, schema-qualified when `schema` is set.
#[must_use]
pub fn database_object(
    database_name: &str,
    securable_type: SecurableType,
    schema: Option<&str>,
    name: &str,
) -> String {
    let element = element(securable_type);
    let parent = database(database_name);
    match schema {
        Some(schema) => format!("{parent}/{element}[@Name='{name}' and @Schema='{schema}']"),
        None => format!("{parent}/{element}[@Name='{name}']"),
    }
}

#[must_use]
pub fn column(parent: &str, name: &str) -> String {
    format!("{parent}/Column[@Name='{name}']")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(database("sales"), "Server/Database[@Name='sales']");
        let table = database_object("sales", SecurableType::Table, Some("dbo"), "t1");
        assert_eq!(
            table,
            "Server/Database[@Name='sales']/Table[@Name='t1' and @Schema='dbo']"
        );
        assert_eq!(
            column(&table, "c1"),
            format!("{table}/Column[@Name='c1']")
        );
        assert_eq!(
            server_object(SecurableType::ServerRole, "r"),
            "Server/ServerRole[@Name='r']"
        );
        assert_eq!(
            database_object("sales", SecurableType::TableValuedFunction, Some("dbo"), "f"),
            "Server/Database[@Name='sales']/TablevaluedFunction[@Name='f' and @Schema='dbo']"
        );
    }
}
