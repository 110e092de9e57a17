use crate::attributes::{AttributeType, EncodeAttributeValue, StunAttributeType};
use crate::common::check_buffer_boundaries;
use crate::context::AttributeEncoderContext;
use crate::StunError;

/// Attribute whose type has no decoder. The raw value is kept so that the
/// attribute is encoded back unchanged and can be listed in an
/// `UNKNOWN-ATTRIBUTES` error response when it is comprehension-required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unknown {
    attr_type: AttributeType,
    value: Vec<u8>,
}

impl Unknown {
    /// Creates an unknown attribute with its raw value
    pub fn new(attr_type: u16, value: &[u8]) -> Self {
        Self {
            attr_type: AttributeType::new(attr_type),
            value: value.to_vec(),
        }
    }

    /// Returns the raw value of this attribute
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl StunAttributeType for Unknown {
    fn attribute_type(&self) -> AttributeType {
        self.attr_type
    }

    fn get_type() -> AttributeType
    where
        Self: Sized,
    {
        // Unknown attributes carry their own type
        AttributeType::new(0x0000)
    }
}

impl From<Unknown> for crate::attributes::StunAttribute {
    fn from(value: Unknown) -> Self {
        crate::attributes::StunAttribute::Unknown(value)
    }
}

impl EncodeAttributeValue for Unknown {
    fn encoded_size(&self) -> usize {
        self.value.len()
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let len = self.value.len();
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, len)?;
        raw_value[..len].copy_from_slice(&self.value);
        Ok(len)
    }
}
