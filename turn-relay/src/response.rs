//! Responses to client requests.

use std::fmt;
use stun_proto::attributes::stun::{self, Software};
use stun_proto::{
    ErrorCode, HMACKey, MessageClass, MessageEncoderBuilder, MessageMethod, StunAttribute,
    StunEncodeError, StunError, StunMessage, StunMessageBuilder, TransactionId,
};

/// Errors building a response
#[derive(Debug)]
pub(crate) enum ResponseError {
    /// An attribute value could not be created
    Attribute(StunError),
    /// The message could not be encoded
    Encode(StunEncodeError),
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResponseError::Attribute(e) => write!(f, "invalid attribute: {}", e),
            ResponseError::Encode(e) => write!(f, "can not encode: {}", e),
        }
    }
}

/// A response being assembled for a request.
#[derive(Debug)]
pub(crate) struct Response {
    method: MessageMethod,
    transaction_id: TransactionId,
    error_code: Option<u16>,
    attributes: Vec<StunAttribute>,
    key: Option<HMACKey>,
    invalid: Option<StunError>,
}

impl Response {
    fn new(request: &StunMessage, error_code: Option<u16>) -> Self {
        Self {
            method: request.method(),
            transaction_id: *request.transaction_id(),
            error_code,
            attributes: Vec::new(),
            key: None,
            invalid: None,
        }
    }

    /// Success response to `request`
    pub fn success(request: &StunMessage) -> Self {
        Self::new(request, None)
    }

    /// Error response to `request` carrying `code`
    pub fn error(request: &StunMessage, code: u16) -> Self {
        Self::new(request, Some(code))
    }

    pub fn with_attribute<T>(mut self, attribute: T) -> Self
    where
        T: Into<StunAttribute>,
    {
        self.attributes.push(attribute.into());
        self
    }

    /// Adds an attribute whose value may have failed to build. The first
    /// failure makes [`ResponseEncoder::encode`] fail.
    pub fn try_with_attribute<T>(mut self, attribute: Result<T, StunError>) -> Self
    where
        T: Into<StunAttribute>,
    {
        match attribute {
            Ok(attribute) => self.with_attribute(attribute),
            Err(e) => {
                self.invalid.get_or_insert(e);
                self
            }
        }
    }

    /// Signs the response with `key`
    pub fn with_integrity(mut self, key: HMACKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Error code of the response, if it is an error response
    pub fn error_code(&self) -> Option<u16> {
        self.error_code
    }
}

/// Encodes responses, adding the attributes every response carries.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResponseEncoder {
    software: Option<Software>,
}

impl ResponseEncoder {
    /// Creates an encoder adding `software` to every response
    pub fn new(software: Option<Software>) -> Self {
        Self { software }
    }

    /// Encodes `response`, appending a `FINGERPRINT` if `fingerprint` is set.
    pub fn encode(&self, response: Response, fingerprint: bool) -> Result<Vec<u8>, ResponseError> {
        if let Some(e) = response.invalid {
            return Err(ResponseError::Attribute(e));
        }

        let class = match response.error_code {
            Some(_) => MessageClass::ErrorResponse,
            None => MessageClass::SuccessResponse,
        };
        let mut builder = StunMessageBuilder::new(response.method, class)
            .with_transaction_id(response.transaction_id);
        if let Some(code) = response.error_code {
            let code = ErrorCode::from_code(code).map_err(ResponseError::Attribute)?;
            builder = builder.with_attribute(stun::ErrorCode::new(code));
        }
        for attribute in response.attributes {
            builder = builder.with_attribute(attribute);
        }
        if let Some(software) = &self.software {
            builder = builder.with_attribute(software.clone());
        }
        let msg = builder.build();

        let mut encoder = MessageEncoderBuilder::default();
        if let Some(key) = response.key {
            encoder = encoder.with_integrity(key);
        }
        if fingerprint {
            encoder = encoder.with_fingerprint();
        }
        encoder
            .build()
            .encode_to_vec(&msg)
            .map_err(ResponseError::Encode)
    }
}
