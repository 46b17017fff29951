use serde::{de::DeserializeOwned, Serialize};

/// Structural description of a record-shaped message.
///
/// A schema names the record and lists the fields every encoded instance must
/// carry. Schemas are `const`-constructible so message types can declare them
/// statically and hand out `&'static` references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Schema {
    name: &'static str,
    fields: &'static [&'static str],
}

impl Schema {
    pub const fn record(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// A schema-typed value that travels over the broker.
///
/// Every instance knows its schema through its type, so decoding can pick the
/// schema before a value exists and encoding can read it back from the value.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn message_schema() -> &'static Schema;

    fn schema(&self) -> &'static Schema {
        Self::message_schema()
    }
}

/// Ties one decode, handle and publish cycle together.
///
/// Holds the schema of the incoming message and the raw buffer it was decoded
/// from. Built per delivery and dropped once the cycle finishes.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    schema: &'static Schema,
    data: &'a [u8],
}

impl<'a> Context<'a> {
    pub fn new(schema: &'static Schema, data: &'a [u8]) -> Self {
        Self { schema, data }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn data_buffer(&self) -> &'a [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const PING_SCHEMA: Schema = Schema::record("Ping", &["id", "body"]);

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        id: u32,
        body: String,
    }

    impl Message for Ping {
        fn message_schema() -> &'static Schema {
            &PING_SCHEMA
        }
    }

    #[test]
    fn test_message_knows_its_schema() {
        let ping = Ping {
            id: 1,
            body: "hello".to_string(),
        };
        assert_eq!(ping.schema().name(), "Ping");
        assert_eq!(ping.schema().fields(), &["id", "body"]);
        assert_eq!(ping.schema().to_string(), "Ping");
    }

    #[test]
    fn test_context_exposes_schema_and_buffer() {
        let raw = b"{\"id\":1,\"body\":\"hello\"}";
        let context = Context::new(Ping::message_schema(), raw);
        assert_eq!(context.schema(), &PING_SCHEMA);
        assert_eq!(context.data_buffer(), raw);
    }
}
