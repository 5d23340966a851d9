//! Message dispatch: the sole entry point between a transport and the
//! codec engine.
//!
//! A [`MessageRegistry`] maps message identifiers and names to their
//! definitions. The creator either decodes a typed message or, for an
//! unregistered identifier, hands back the raw bytes untouched.

use crate::codec::decode;
use crate::error::CodecResult;
use crate::layout::MessageLayout;
use crate::schema::{MessageDef, Schema};
use crate::value::MessageValue;
use std::sync::Arc;

/// Outcome of dispatching an identified payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Created {
    /// The identifier was registered and the payload decoded
    Message(MessageValue),
    /// The identifier was not registered; payload returned untouched
    Opaque(Vec<u8>),
}

/// Immutable id/name dispatch table over a shared schema.
///
/// The registry is built once after schema load and may be shared by
/// reference across tasks.
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    schema: Arc<Schema>,
}

impl MessageRegistry {
    /// Wraps a loaded schema.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// The backing schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Looks a message up by identifier.
    #[must_use]
    pub fn by_id(&self, id: u32) -> Option<&MessageDef> {
        self.schema.message_by_id(id)
    }

    /// Looks a message up by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&MessageDef> {
        self.schema.def(name).filter(|d| d.is_message())
    }

    /// Identifier of a named message.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name(name).and_then(|d| d.id)
    }

    /// Layout of a registered message, used by transports that validate
    /// payload lengths against the schema.
    #[must_use]
    pub fn layout_of(&self, id: u32) -> Option<MessageLayout> {
        self.by_id(id).map(|def| self.schema.layout(def))
    }

    /// Creator: decodes the payload of a registered identifier, or
    /// returns the bytes untouched for an unknown one.
    pub fn create(&self, id: u32, bytes: &[u8]) -> CodecResult<Created> {
        match self.by_id(id) {
            Some(def) => Ok(Created::Message(decode(&self.schema, def, bytes)?)),
            None => {
                log::debug!("no message registered for id 0x{id:02X}, keeping payload opaque");
                Ok(Created::Opaque(bytes.to_vec()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn registry() -> MessageRegistry {
        let schema = Schema::from_json_str(
            r#"{
                "types": [{"name": "Aux", "desc": "d", "fields": [
                    {"name": "v", "type": "uint8", "desc": "v"}
                ]}],
                "messages": [{"name": "Ping", "desc": "d", "id": 7, "fields": [
                    {"name": "token", "type": "uint16", "desc": "t"}
                ]}]
            }"#,
        )
        .unwrap();
        MessageRegistry::new(Arc::new(schema))
    }

    #[test]
    fn creates_typed_message_for_known_id() {
        let registry = registry();
        let created = registry.create(7, &[0x34, 0x12]).unwrap();
        let Created::Message(msg) = created else {
            panic!("expected typed message");
        };
        assert_eq!(msg.name, "Ping");
        assert_eq!(msg.scalar("token"), Some(0x1234));
    }

    #[test]
    fn returns_opaque_for_unknown_id() {
        let registry = registry();
        let created = registry.create(9, &[0xAA, 0xBB]).unwrap();
        assert_eq!(created, Created::Opaque(vec![0xAA, 0xBB]));
    }

    #[test]
    fn propagates_decode_errors() {
        let registry = registry();
        assert!(matches!(
            registry.create(7, &[0x34]),
            Err(CodecError::ShortBuffer { .. })
        ));
    }

    #[test]
    fn name_lookup_skips_compounds() {
        let registry = registry();
        assert!(registry.by_name("Ping").is_some());
        assert!(registry.by_name("Aux").is_none());
        assert_eq!(registry.id_of("Ping"), Some(7));
    }

    #[test]
    fn layout_for_length_validation() {
        let registry = registry();
        let layout = registry.layout_of(7).unwrap();
        assert!(layout.matches_len(2));
        assert!(!layout.matches_len(3));
    }
}
