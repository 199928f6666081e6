use prost::Message;
use prost_types::Any;

#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error("payload has type URL '{actual}', expected '{expected}'")]
    TypeMismatch { expected: String, actual: String },
    #[error("failed to decode payload: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Wraps a `prost::Message` as an opaque, self-describing payload (type URL + bytes), per the
/// envelope's typed-value container requirement.
pub fn pack<T: Message>(msg: &T) -> Result<Any, prost::EncodeError> {
    Ok(Any {
        type_url: type_url::<T>(),
        value: msg.encode_to_vec(),
    })
}

/// Unwraps an opaque payload into `T`, checking the type URL matches what the caller expects.
pub fn unpack<T: Message + Default>(any: &Any) -> Result<T, UnpackError> {
    let expected = type_url::<T>();
    if any.type_url != expected {
        return Err(UnpackError::TypeMismatch {
            expected,
            actual: any.type_url.clone(),
        });
    }
    Ok(T::decode(any.value.as_slice())?)
}

fn type_url<T>() -> String {
    format!("type.googleapis.com/krt.{}", std::any::type_name::<T>())
}
