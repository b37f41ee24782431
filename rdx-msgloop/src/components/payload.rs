//! The structured message type and its checked, type-erased payload.

use crate::error::PayloadError;
use std::any::{type_name, Any};
use std::fmt;

/// A type-erased value attached to a `Message`.
///
/// The concrete type's name is recorded at attach time and every retrieval is
/// checked against it, so asking for the wrong type fails with
/// `PayloadError::TypeMismatch` instead of reinterpreting the value.
pub struct Payload {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Payload {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Name of the type the payload was created with.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Result<&T, PayloadError> {
        self.value
            .downcast_ref::<T>()
            .ok_or_else(|| self.mismatch::<T>())
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Result<&mut T, PayloadError> {
        let err = self.mismatch::<T>();
        self.value.downcast_mut::<T>().ok_or(err)
    }

    /// Unwraps the payload into its value. On a type mismatch the payload is
    /// handed back intact together with the error.
    pub fn downcast<T: Any>(self) -> Result<T, (Self, PayloadError)> {
        let err = self.mismatch::<T>();
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err((Self { value, type_name }, err)),
        }
    }

    fn mismatch<T: Any>(&self) -> PayloadError {
        PayloadError::TypeMismatch {
            expected: type_name::<T>(),
            actual: self.type_name,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A structured unit of work handed to the loop's `on_handle` handler.
///
/// `what`, `arg1` and `arg2` are free-form integers whose meaning is up to the
/// application. The optional payload is owned by the message until a handler
/// takes it; a handler may move it into a new message for another loop.
#[derive(Debug, Default)]
pub struct Message {
    pub what: i32,
    pub arg1: i32,
    pub arg2: i32,
    payload: Option<Payload>,
}

impl Message {
    pub fn new(what: i32) -> Self {
        Self {
            what,
            ..Self::default()
        }
    }

    pub fn with_args(mut self, arg1: i32, arg2: i32) -> Self {
        self.arg1 = arg1;
        self.arg2 = arg2;
        self
    }

    pub fn with_payload<T: Any + Send>(mut self, value: T) -> Self {
        self.attach(value);
        self
    }

    /// Stores `value` as the payload, dropping any previous one.
    pub fn attach<T: Any + Send>(&mut self, value: T) -> &mut Self {
        self.payload = Some(Payload::new(value));
        self
    }

    /// Borrows the payload as `T`.
    pub fn retrieve<T: Any>(&self) -> Result<&T, PayloadError> {
        self.payload
            .as_ref()
            .ok_or(PayloadError::Empty)?
            .downcast_ref::<T>()
    }

    pub fn retrieve_mut<T: Any>(&mut self) -> Result<&mut T, PayloadError> {
        self.payload
            .as_mut()
            .ok_or(PayloadError::Empty)?
            .downcast_mut::<T>()
    }

    /// Moves the payload out as `T`. On a mismatch the payload stays attached.
    pub fn take<T: Any>(&mut self) -> Result<T, PayloadError> {
        let payload = self.payload.take().ok_or(PayloadError::Empty)?;
        match payload.downcast::<T>() {
            Ok(value) => Ok(value),
            Err((payload, err)) => {
                self.payload = Some(payload);
                Err(err)
            }
        }
    }

    pub fn take_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }

    pub fn set_payload(&mut self, payload: Option<Payload>) {
        self.payload = payload;
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn payload_type_name(&self) -> Option<&'static str> {
        self.payload.as_ref().map(Payload::type_name)
    }
}
