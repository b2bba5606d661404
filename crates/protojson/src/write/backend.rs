//! The two write back-ends behind one algorithm.
//!
//! Both operate on a decoded [`DynamicMessage`]; what differs is where
//! type references resolve (the in-memory pool vs. the schema-service
//! cache) and whether extensions exist at all.

use std::sync::Arc;

use crate::descriptor::{Descriptor, DescriptorPool, Field, TypeSource};
use crate::error::{Error, Result};
use crate::message::DynamicMessage;
use crate::resolver::ResolverPool;
use crate::wire;

/// The capability set the message → JSON algorithm is written against.
pub(crate) trait WriteBackend {
    /// Resolves the message type a field refers to.
    fn message_type_of(&self, field: &Field) -> Result<Arc<Descriptor>>;

    /// Resolves a message type from a runtime-supplied type URL.
    fn dynamic_type(&self, type_url: &str) -> Result<Arc<Descriptor>>;

    /// Decodes the wire-format payload embedded in an `Any`.
    fn decode_embedded(&self, desc: &Arc<Descriptor>, bytes: &[u8]) -> Result<DynamicMessage>;

    /// Resolves an enum number to its declared name.
    fn enum_name_by_number(&self, field: &Field, number: i32) -> Result<String>;

    /// Appends every extension of `msg`'s type that carries a value.
    fn find_extensions(&self, msg: &DynamicMessage, out: &mut Vec<Arc<Field>>);
}

/// Write back-end over the in-memory descriptor pool.
pub(crate) struct ReflectiveWrite<'p> {
    pub(crate) pool: &'p DescriptorPool,
}

impl WriteBackend for ReflectiveWrite<'_> {
    fn message_type_of(&self, field: &Field) -> Result<Arc<Descriptor>> {
        self.pool.message_type(field.message_type_name()?)
    }

    fn dynamic_type(&self, type_url: &str) -> Result<Arc<Descriptor>> {
        self.pool.message_type(type_url)
    }

    fn decode_embedded(&self, desc: &Arc<Descriptor>, bytes: &[u8]) -> Result<DynamicMessage> {
        wire::decode_message(desc, self.pool, bytes)
    }

    fn enum_name_by_number(&self, field: &Field, number: i32) -> Result<String> {
        let enum_type = self.pool.enum_type(field.message_type_name()?)?;
        enum_type
            .name_by_number(number)
            .map(str::to_owned)
            .ok_or_else(|| Error::invalid(format!("unknown enum number: {number}")))
    }

    fn find_extensions(&self, msg: &DynamicMessage, out: &mut Vec<Arc<Field>>) {
        for extension in self.pool.extensions_of(msg.descriptor().full_name()) {
            if msg.len_of(extension.number()) > 0 {
                out.push(Arc::clone(extension));
            }
        }
    }
}

/// Write back-end over a schema-service descriptor cache.
pub(crate) struct ResolverWrite<'p> {
    pub(crate) pool: &'p ResolverPool<'p>,
}

impl WriteBackend for ResolverWrite<'_> {
    fn message_type_of(&self, field: &Field) -> Result<Arc<Descriptor>> {
        self.pool.message_type(field.message_type_name()?)
    }

    fn dynamic_type(&self, type_url: &str) -> Result<Arc<Descriptor>> {
        self.pool.find_message(type_url)
    }

    fn decode_embedded(&self, desc: &Arc<Descriptor>, bytes: &[u8]) -> Result<DynamicMessage> {
        wire::decode_message(desc, self.pool, bytes)
    }

    fn enum_name_by_number(&self, field: &Field, number: i32) -> Result<String> {
        let enum_type = self.pool.find_enum(field.message_type_name()?)?;
        enum_type
            .name_by_number(number)
            .map(str::to_owned)
            .ok_or_else(|| Error::invalid(format!("unknown enum number: {number}")))
    }

    fn find_extensions(&self, _msg: &DynamicMessage, _out: &mut Vec<Arc<Field>>) {
        // The schema service wire shape does not describe extensions.
    }
}
