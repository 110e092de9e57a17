use crate::attributes::{AttributeType, DecodeAttributeValue, StunAttribute};
use crate::context::AttributeDecoderContext;
use crate::{StunAttributeType, StunError};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Builds a [`StunAttribute`] out of a raw attribute value.
pub(crate) type DecoderHandler =
    fn(AttributeDecoderContext) -> Result<(StunAttribute, usize), StunError>;

fn decode_into<A>(ctx: AttributeDecoderContext) -> Result<(StunAttribute, usize), StunError>
where
    A: DecodeAttributeValue + Into<StunAttribute>,
{
    A::decode(ctx).map(|(attr, size)| (attr.into(), size))
}

/// Decoders of the known attribute types, keyed by type.
#[derive(Default)]
pub(crate) struct DecoderRegistry(HashMap<AttributeType, DecoderHandler>);

impl DecoderRegistry {
    /// Adds the decoder of `A`.
    ///
    /// # Panics
    ///
    /// When a decoder for the same type was already added.
    pub fn add<A>(&mut self) -> &mut Self
    where
        A: DecodeAttributeValue + StunAttributeType + Into<StunAttribute> + 'static,
    {
        let attr_type = A::get_type();
        if self.0.insert(attr_type, decode_into::<A>).is_some() {
            panic!("{} registered twice", attr_type);
        }
        self
    }
}

lazy_static! {
    static ref DECODERS: DecoderRegistry = {
        let mut registry = DecoderRegistry::default();
        crate::attributes::stun::register(&mut registry);
        crate::attributes::turn::register(&mut registry);
        registry
    };
}

/// Decoder for `attr_type`, if it is a known attribute.
pub(crate) fn get_handler(attr_type: AttributeType) -> Option<&'static DecoderHandler> {
    DECODERS.0.get(&attr_type)
}
